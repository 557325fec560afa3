//! Rendition encoding with GPU to CPU fallback
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


use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::coordinator::TranscodeCoordinator;
use crate::error::EncodeError;
use crate::ffmpeg::{
    accelerated_encode_args, is_accelerator_failure, software_encode_args, CommandRunner, Tool,
};
use crate::ladder::RenditionTarget;

/// Pause between encoder exit and output verification
pub const OUTPUT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Which encoder produced a rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Accelerated,
    Software,
    /// Accelerated attempt failed, software succeeded
    Fallback,
}

/// Encodes one rendition into an MPEG-TS intermediate
pub struct Transcoder {
    runner: Arc<dyn CommandRunner>,
    coordinator: Arc<TranscodeCoordinator>,
    settle_delay: Duration,
}

impl Transcoder {
    pub fn new(runner: Arc<dyn CommandRunner>, coordinator: Arc<TranscodeCoordinator>) -> Self {
        Self {
            runner,
            coordinator,
            settle_delay: OUTPUT_SETTLE_DELAY,
        }
    }

    /// Encode `target` from `input` into `output`, then check the file landed.
    ///
    /// The caller holds a coordinator slot for the duration.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: &RenditionTarget,
    ) -> Result<EncodeMode, EncodeError> {
        let rendition = target.file_name();
        let mode = self.encode(input, output, target, &rendition).await?;

        tokio::time::sleep(self.settle_delay).await;
        verify_output(output).await?;

        info!(rendition = %rendition, mode = ?mode, "Rendition encoded");
        Ok(mode)
    }

    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        target: &RenditionTarget,
        rendition: &str,
    ) -> Result<EncodeMode, EncodeError> {
        if !self.coordinator.gpu_enabled().await {
            if self.coordinator.use_gpu() {
                info!(rendition = rendition, "GPU disabled, encoding in software");
            } else {
                info!(rendition = rendition, "Encoding in software");
            }
            self.run(false, software_encode_args(input, output, target)).await?;
            return Ok(EncodeMode::Software);
        }

        info!(rendition = rendition, "Encoding on GPU");
        let breaker = self.coordinator.breaker();
        match self.run(true, accelerated_encode_args(input, output, target)).await {
            Ok(()) => {
                breaker.record_success().await;
                return Ok(EncodeMode::Accelerated);
            }
            Err(e) => {
                warn!(rendition = rendition, error = %e, "GPU encode failed, falling back to software");
                if e.is_accelerator() {
                    breaker.record_failure().await;
                }
            }
        }

        self.run(false, software_encode_args(input, output, target)).await?;
        Ok(EncodeMode::Fallback)
    }

    async fn run(&self, accelerated: bool, args: Vec<String>) -> Result<(), EncodeError> {
        let output = self
            .runner
            .run(Tool::Ffmpeg, &args)
            .await
            .map_err(|source| EncodeError::Spawn {
                program: Tool::Ffmpeg.name().to_string(),
                source,
            })?;

        if output.success {
            return Ok(());
        }

        if accelerated && is_accelerator_failure(&output) {
            return Err(EncodeError::Accelerator(output.stderr_tail(5)));
        }
        Err(EncodeError::Failed {
            code: output.code,
            stderr: output.stderr_tail(10),
        })
    }
}

/// An encode only counts if it left a non-empty file behind
pub async fn verify_output(output: &Path) -> Result<(), EncodeError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(EncodeError::MissingOutput(output.to_path_buf())),
    }
}
