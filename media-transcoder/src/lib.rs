//! Media Transcoder Library
//!
//! This library provides the transcoding pipeline behind the worker:
//! - Source probing and rendition planning
//! - GPU-first encoding with a failure breaker and software fallback
//! - HLS segmentation and manifest persistence
//! - Artifact upload through a bounded worker pool
//! - Transactional resource and video status settlement
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


pub mod cache;
pub mod completion;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod ffmpeg;
pub mod health;
pub mod job;
pub mod ladder;
pub mod pipeline;
pub mod probe;
pub mod publisher;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod transcode;
pub mod worker;

pub use completion::{CompletionReport, JobStateMachine};
pub use coordinator::{GpuBreaker, TranscodeCoordinator};
pub use error::{EncodeError, PipelineError, StoreError};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineSettings};
pub use publisher::{PublishOutcome, Publisher, UploadSummary};
pub use worker::TranscodeWorker;
