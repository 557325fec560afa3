//! Event payload schemas
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

use crate::error::{CinderError, Result};
use crate::status::Status;

// ============================================================================
// Transcode Event Payloads
// ============================================================================

/// Payload for `transcode.requested` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeRequestedPayload {
    pub video_id: i64,
    pub resource_id: i64,
    /// Local path of the uploaded source file
    pub input_file: String,
    /// Directory that receives every produced file, with trailing separator
    pub output_dir: String,
    /// Directory name used to namespace storage keys
    pub dir_name: String,
    /// Where to write a cover frame, if the uploader wants one
    #[serde(default)]
    pub cover_file: Option<String>,
}

impl TranscodeRequestedPayload {
    pub fn validate(&self) -> Result<()> {
        if self.input_file.trim().is_empty() {
            return Err(CinderError::Validation("input_file is empty".to_string()));
        }
        if self.output_dir.trim().is_empty() {
            return Err(CinderError::Validation("output_dir is empty".to_string()));
        }
        // dir_name becomes part of an object key
        if self.dir_name.is_empty() || self.dir_name.contains('/') || self.dir_name.contains("..") {
            return Err(CinderError::Validation(format!(
                "invalid dir_name: {:?}",
                self.dir_name
            )));
        }
        Ok(())
    }
}

/// Payload for `transcode.completed` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeCompletedPayload {
    pub video_id: i64,
    pub resource_id: i64,
    /// Final resource status after reconciliation
    pub status: Status,
    pub renditions_succeeded: usize,
    pub renditions_total: usize,
    pub files_uploaded: usize,
}
