//! HLS segmenting of an encoded intermediate
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


use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::ffmpeg::{segment_args, CommandRunner, Tool};

/// Playlist path for a rendition: `DIR/NAME.m3u8`
pub fn playlist_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{}.m3u8", name))
}

/// Segment file pattern for a rendition: `DIR/NAME_%05d.ts`
pub fn segment_pattern(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{}_%05d.ts", name))
}

/// Cut `input` into 10 second segments and return the playlist path
pub async fn segment(
    runner: &dyn CommandRunner,
    input: &Path,
    output_dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    let playlist = playlist_path(output_dir, name);
    let pattern = segment_pattern(output_dir, name);

    let output = runner
        .run(Tool::Ffmpeg, &segment_args(input, &playlist, &pattern))
        .await
        .map_err(|e| PipelineError::Segment(format!("failed to start ffmpeg: {}", e)))?;

    if !output.success {
        warn!(rendition = name, code = ?output.code, "Segmenting failed");
        return Err(PipelineError::Segment(format!(
            "ffmpeg exited with status {:?}: {}",
            output.code,
            output.stderr_tail(5)
        )));
    }

    info!(rendition = name, playlist = %playlist.display(), "Rendition segmented");
    Ok(playlist)
}
