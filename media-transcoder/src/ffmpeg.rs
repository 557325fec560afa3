//! FFmpeg / FFprobe invocation
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


use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::EncodeError;
use crate::ladder::RenditionTarget;

/// Stderr lines that mean the hardware encoder cannot be used at all
const ACCELERATOR_SIGNATURES: &[&str] = &[
    "No NVENC capable devices found",
    "Cannot load nvcuda.dll",
    "CUDA driver version is insufficient",
    "h264_nvenc",
];

/// External media tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }
}

/// Captured result of one tool invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last few stderr lines, enough to explain a failure in a log line
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Runs external media tools
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, tool: Tool, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runs the real binaries with `tokio::process`
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl ProcessRunner {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg_path,
            Tool::Ffprobe => &self.ffprobe_path,
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, tool: Tool, args: &[String]) -> std::io::Result<CommandOutput> {
        let program = self.program(tool);
        debug!(program = program, args = ?args, "Running media tool");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `ffprobe` arguments dumping format and streams as JSON
pub fn probe_args(input: &Path) -> Vec<String> {
    let input = path_arg(input);
    args(&[
        "-i",
        &input,
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
}

/// Software (libx264) encode into an MPEG-TS intermediate
pub fn software_encode_args(input: &Path, output: &Path, target: &RenditionTarget) -> Vec<String> {
    let (input, output) = (path_arg(input), path_arg(output));
    args(&[
        "-i",
        &input,
        "-crf",
        "20",
        "-s",
        &target.resolution,
        "-b:v",
        &target.bitrate,
        "-c:v",
        "libx264",
        "-r",
        &target.fps,
        "-vsync",
        "cfr",
        "-c:a",
        "copy",
        "-f",
        "mpegts",
        "-copyts",
        &output,
    ])
}

/// NVENC encode into an MPEG-TS intermediate
pub fn accelerated_encode_args(input: &Path, output: &Path, target: &RenditionTarget) -> Vec<String> {
    let (input, output) = (path_arg(input), path_arg(output));
    args(&[
        "-i",
        &input,
        "-crf",
        "20",
        "-s",
        &target.resolution,
        "-preset",
        "p3",
        "-b:v",
        &target.bitrate,
        "-c:v",
        "h264_nvenc",
        "-r",
        &target.fps,
        "-vsync",
        "cfr",
        "-c:a",
        "copy",
        "-f",
        "mpegts",
        "-copyts",
        &output,
    ])
}

/// Split an intermediate stream into 10 second segments plus a playlist
pub fn segment_args(input: &Path, playlist: &Path, segment_pattern: &Path) -> Vec<String> {
    let (input, playlist, pattern) = (path_arg(input), path_arg(playlist), path_arg(segment_pattern));
    args(&[
        "-i",
        &input,
        "-c",
        "copy",
        "-map",
        "0",
        "-f",
        "segment",
        "-segment_list",
        &playlist,
        "-segment_time",
        "10",
        "-segment_list_flags",
        "+live",
        "-break_non_keyframes",
        "1",
        &pattern,
    ])
}

/// Grab the first frame as a still image
pub fn cover_args(input: &Path, output: &Path) -> Vec<String> {
    let (input, output) = (path_arg(input), path_arg(output));
    args(&["-i", &input, "-vframes", "1", "-y", &output])
}

/// Whether a failed hardware encode points at the accelerator itself
pub fn is_accelerator_failure(output: &CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr);
    ACCELERATOR_SIGNATURES.iter().any(|sig| text.contains(sig))
        || text.to_ascii_lowercase().contains("nvenc")
}

/// Extract a cover image from the source
pub async fn extract_cover(
    runner: &dyn CommandRunner,
    input: &Path,
    output: &Path,
) -> Result<(), EncodeError> {
    let out = runner
        .run(Tool::Ffmpeg, &cover_args(input, output))
        .await
        .map_err(|source| EncodeError::Spawn {
            program: Tool::Ffmpeg.name().to_string(),
            source,
        })?;

    if !out.success {
        warn!(
            input = %input.display(),
            code = ?out.code,
            "Cover extraction failed"
        );
        return Err(EncodeError::Failed {
            code: out.code,
            stderr: out.stderr_tail(10),
        });
    }

    info!(output = %output.display(), "Cover extracted");
    Ok(())
}
