//! Per-invocation transcoding job
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


use cinder_types::TranscodeRequestedPayload;
use std::path::{Path, PathBuf};

use crate::ladder::derive_frame_targets;
use crate::probe::ProbeInfo;

/// Everything the rendition tasks need about one source
#[derive(Debug, Clone)]
pub struct TranscodingJob {
    pub video_id: i64,
    pub resource_id: i64,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub dir_name: String,
    pub width: u32,
    pub height: u32,
    pub codec_name: String,
    pub duration: f64,
    pub avg_frame_rate: String,
    /// Source rate as frames per second, for logs
    pub frame_rate: Option<String>,
    pub fps30: String,
    pub fps60: Option<String>,
}

impl TranscodingJob {
    pub fn new(request: &TranscodeRequestedPayload, probe: ProbeInfo) -> Self {
        let (fps30, fps60) = derive_frame_targets(&probe.avg_frame_rate);
        Self {
            video_id: request.video_id,
            resource_id: request.resource_id,
            input_file: PathBuf::from(&request.input_file),
            output_dir: PathBuf::from(&request.output_dir),
            dir_name: request.dir_name.clone(),
            width: probe.width,
            height: probe.height,
            codec_name: probe.codec_name,
            duration: probe.duration,
            avg_frame_rate: probe.avg_frame_rate,
            frame_rate: probe.frame_rate,
            fps30,
            fps60,
        }
    }

    /// Path of a file produced in the job's output directory
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn input(&self) -> &Path {
        &self.input_file
    }
}
