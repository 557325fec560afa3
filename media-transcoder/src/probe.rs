//! Source inspection with ffprobe
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


use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::ffmpeg::{probe_args, CommandRunner, Tool};

/// Properties of the source that drive rendition planning
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub codec_name: String,
    /// Seconds; 0.0 when ffprobe reports nothing parsable
    pub duration: f64,
    /// Raw `num/den` rate as reported, e.g. `60000/1001`
    pub avg_frame_rate: String,
    /// Same rate rounded to two decimals, e.g. `59.94`
    pub frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    avg_frame_rate: String,
}

/// Probe a source file. Any failure here is fatal for the job.
pub async fn probe(runner: &dyn CommandRunner, input: &Path) -> Result<ProbeInfo> {
    let output = runner
        .run(Tool::Ffprobe, &probe_args(input))
        .await
        .map_err(|e| PipelineError::Probe(format!("failed to start ffprobe: {}", e)))?;

    if !output.success {
        warn!(input = %input.display(), code = ?output.code, "ffprobe failed");
        return Err(PipelineError::Probe(format!(
            "ffprobe exited with status {:?}: {}",
            output.code,
            output.stderr_tail(5)
        )));
    }

    let info = parse_probe_output(output.stdout.as_bytes())?;

    info!(
        input = %input.display(),
        width = info.width,
        height = info.height,
        codec = %info.codec_name,
        duration = info.duration,
        avg_frame_rate = %info.avg_frame_rate,
        "Source probed"
    );

    Ok(info)
}

/// Read ffprobe JSON. Only the first stream is considered.
pub fn parse_probe_output(json: &[u8]) -> Result<ProbeInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PipelineError::Probe(format!("malformed ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Probe("no streams in source".to_string()))?;

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_rate = normalized_frame_rate(&stream.avg_frame_rate);

    Ok(ProbeInfo {
        width: stream.width,
        height: stream.height,
        codec_name: stream.codec_name,
        duration,
        avg_frame_rate: stream.avg_frame_rate,
        frame_rate,
    })
}

/// `60000/1001` -> `59.94`; None for a zero denominator or malformed input
pub fn normalized_frame_rate(avg: &str) -> Option<String> {
    let (num, den) = avg.split_once('/')?;
    let num: i64 = num.trim().parse().ok()?;
    let den: i64 = den.trim().parse().ok()?;
    if den == 0 {
        return None;
    }
    Some(format!("{:.2}", num as f64 / den as f64))
}
