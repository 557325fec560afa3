//! Persisted entities and the typed partial updates the pipeline may apply
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CinderError, Result};
use crate::status::Status;

/// Aggregate entity grouping every resource derived from one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub status: Status,
}

/// One uploaded source file and its processing lifecycle, owned by a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    /// Owning video id
    pub vid: i64,
    pub status: Status,
}

/// Manifest record written once per successfully produced rendition.
///
/// Rows are append-only. A resource without any row produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoIndexFile {
    pub id: i64,
    pub resource_id: i64,
    pub quality: String,
    pub dir_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`VideoIndexFile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVideoIndexFile {
    pub resource_id: i64,
    pub quality: String,
    pub dir_name: String,
    pub content: String,
}

/// Fields of a resource that completion logic may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub status: Status,
}

impl ResourceUpdate {
    pub fn status(status: Status) -> Self {
        Self { status }
    }

    /// Completion only ever moves a resource to a post-processing state.
    pub fn validate(&self) -> Result<()> {
        match self.status {
            Status::WaitingReview | Status::ProcessingFail | Status::Processing => Ok(()),
            other => Err(CinderError::ForbiddenStatus {
                field: "resource.status",
                status: other.code(),
            }),
        }
    }
}

/// Fields of a video that completion logic may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoUpdate {
    pub status: Status,
}

impl VideoUpdate {
    pub fn status(status: Status) -> Self {
        Self { status }
    }

    pub fn validate(&self) -> Result<()> {
        match self.status {
            Status::WaitingReview | Status::ProcessingFail => Ok(()),
            other => Err(CinderError::ForbiddenStatus {
                field: "video.status",
                status: other.code(),
            }),
        }
    }
}
