//! Error types for Cinder
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


use thiserror::Error;

/// Errors that can occur when decoding or validating shared Cinder types
#[derive(Error, Debug)]
pub enum CinderError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown status code: {0}")]
    UnknownStatus(i32),

    #[error("Status {status} cannot be written by {field} update")]
    ForbiddenStatus { field: &'static str, status: i32 },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CinderError>;
