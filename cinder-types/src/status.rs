//! Status codes shared by resources and videos
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CinderError;

/// Lifecycle status of a resource or a video.
///
/// Values cross the persistence and bus boundaries as integer codes, and the
/// same code means the same thing on both entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Status {
    /// Review passed
    Approved,
    /// Record exists, no processing started yet
    Created,
    /// Transcoding in progress
    Processing,
    /// Transcoding finished, waiting for a reviewer
    WaitingReview,
    /// Review rejected
    Rejected,
    /// Transcoding produced nothing usable
    ProcessingFail,
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Status::Approved => 0,
            Status::Created => 100,
            Status::Processing => 200,
            Status::WaitingReview => 500,
            Status::Rejected => 2000,
            Status::ProcessingFail => 3000,
        }
    }

    /// Terminal review outcomes are owned by reviewers, never by the pipeline.
    pub const fn is_review_outcome(self) -> bool {
        matches!(self, Status::Approved | Status::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Approved => "approved",
            Status::Created => "created",
            Status::Processing => "processing",
            Status::WaitingReview => "waiting_review",
            Status::Rejected => "rejected",
            Status::ProcessingFail => "processing_fail",
        }
    }
}

impl TryFrom<i32> for Status {
    type Error = CinderError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Approved),
            100 => Ok(Status::Created),
            200 => Ok(Status::Processing),
            500 => Ok(Status::WaitingReview),
            2000 => Ok(Status::Rejected),
            3000 => Ok(Status::ProcessingFail),
            other => Err(CinderError::UnknownStatus(other)),
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}
