//! Error types for the transcoding pipeline
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


use std::path::PathBuf;
use thiserror::Error;

use cinder_types::CinderError;

/// Failure of a single encode attempt
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Hardware encoder missing or its driver is unusable
    #[error("accelerator unavailable: {0}")]
    Accelerator(String),

    #[error("encoder exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder reported success but {0} is missing or empty")]
    MissingOutput(PathBuf),
}

impl EncodeError {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, EncodeError::Accelerator(_))
    }
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Validation(#[from] CinderError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by pipeline stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("probe failed: {0}")]
    Probe(String),

    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("segment failed: {0}")]
    Segment(String),

    #[error("manifest write failed: {0}")]
    ManifestWrite(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("status transaction failed: {0}")]
    Transaction(#[from] StoreError),

    #[error("transcode slot pool closed")]
    SlotPoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
