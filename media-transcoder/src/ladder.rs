//! Rendition ladder planning
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


use crate::job::TranscodingJob;

/// NTSC 29.97 target used for every standard rendition
pub const FPS_30: &str = "30000/1001";
/// NTSC 59.94 target for the high frame-rate 1080p rendition
pub const FPS_60: &str = "60000/1001";

/// Tiers in descending order; a source gets its own tier and every tier below it
const TIERS: [u32; 4] = [1080, 720, 480, 360];

/// One output of the ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionTarget {
    /// `WxH`, passed straight to `-s`
    pub resolution: String,
    /// e.g. `3000k`
    pub bitrate: String,
    /// Rational frame rate passed to `-r`
    pub fps: String,
    /// `30` or `60`
    pub fps_label: &'static str,
}

impl RenditionTarget {
    fn new(resolution: &str, bitrate: &str, fps: &str, fps_label: &'static str) -> Self {
        Self {
            resolution: resolution.to_string(),
            bitrate: bitrate.to_string(),
            fps: fps.to_string(),
            fps_label,
        }
    }

    /// Base name for every file of this rendition, e.g. `1280x720_2000k_30`.
    /// Doubles as the quality label of the manifest row.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}", self.resolution, self.bitrate, self.fps_label)
    }
}

pub fn width_class(width: u32) -> u32 {
    match width {
        w if w >= 1920 => 1080,
        w if w >= 1280 => 720,
        w if w >= 720 => 480,
        _ => 360,
    }
}

pub fn height_class(height: u32) -> u32 {
    match height {
        h if h >= 1080 => 1080,
        h if h >= 720 => 720,
        h if h >= 480 => 480,
        _ => 360,
    }
}

/// Highest tier the source qualifies for on either axis
pub fn select_tier(width: u32, height: u32) -> u32 {
    width_class(width).max(height_class(height))
}

/// Derive the 30fps and optional 60fps targets from ffprobe's `avg_frame_rate`.
///
/// Sources below 30fps keep their own rate; sources at 60fps or above also
/// get a 59.94 target. Only the 60fps threshold allows for NTSC timing, so
/// 60000/1001 counts as 60 while anything under 30 keeps its own rate.
pub fn derive_frame_targets(avg_frame_rate: &str) -> (String, Option<String>) {
    let default = (FPS_30.to_string(), None);

    let Some((num, den)) = avg_frame_rate.split_once('/') else {
        return default;
    };
    let (Ok(num), Ok(den)) = (num.trim().parse::<i64>(), den.trim().parse::<i64>()) else {
        return default;
    };
    if den <= 0 {
        return default;
    }

    let (num, den) = (num as i128, den as i128);
    if num < 30 * den {
        (avg_frame_rate.to_string(), None)
    } else if num * 1001 >= 60 * 1000 * den {
        // 59.94 and up counts as 60
        (FPS_30.to_string(), Some(FPS_60.to_string()))
    } else {
        default
    }
}

/// Ordered ladder for a probed job
pub fn plan_renditions(job: &TranscodingJob, generate_1080p60: bool) -> Vec<RenditionTarget> {
    let tier = select_tier(job.width, job.height);
    let fps30 = job.fps30.as_str();

    let mut targets = Vec::new();
    for &t in TIERS.iter().filter(|&&t| t <= tier) {
        match t {
            1080 => {
                if let (true, Some(fps60)) = (generate_1080p60, job.fps60.as_deref()) {
                    targets.push(RenditionTarget::new("1920x1080", "6000k", fps60, "60"));
                }
                targets.push(RenditionTarget::new("1920x1080", "3000k", fps30, "30"));
            }
            720 => targets.push(RenditionTarget::new("1280x720", "2000k", fps30, "30")),
            480 => targets.push(RenditionTarget::new("854x480", "900k", fps30, "30")),
            _ => targets.push(RenditionTarget::new("640x360", "500k", fps30, "30")),
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TranscodingJob;

    fn job(width: u32, height: u32, avg: &str) -> TranscodingJob {
        let (fps30, fps60) = derive_frame_targets(avg);
        TranscodingJob {
            video_id: 1,
            resource_id: 1,
            input_file: "/data/in/upload.mp4".into(),
            output_dir: "/data/in".into(),
            dir_name: "in".to_string(),
            width,
            height,
            codec_name: "h264".to_string(),
            duration: 10.0,
            avg_frame_rate: avg.to_string(),
            frame_rate: None,
            fps30,
            fps60,
        }
    }

    fn names(targets: &[RenditionTarget]) -> Vec<String> {
        targets.iter().map(|t| t.file_name()).collect()
    }

    #[test]
    fn test_classes() {
        assert_eq!(width_class(1920), 1080);
        assert_eq!(width_class(1919), 720);
        assert_eq!(width_class(720), 480);
        assert_eq!(width_class(719), 360);
        assert_eq!(height_class(1080), 1080);
        assert_eq!(height_class(720), 720);
        assert_eq!(height_class(479), 360);
        // Portrait 1080x1920 qualifies through its height
        assert_eq!(select_tier(1080, 1920), 1080);
    }

    #[test]
    fn test_frame_targets() {
        assert_eq!(derive_frame_targets("0/0"), (FPS_30.to_string(), None));
        assert_eq!(derive_frame_targets("25/1"), ("25/1".to_string(), None));
        assert_eq!(derive_frame_targets("30/1"), (FPS_30.to_string(), None));
        assert_eq!(derive_frame_targets("24000/1001"), ("24000/1001".to_string(), None));
        assert_eq!(derive_frame_targets("30000/1001"), (FPS_30.to_string(), None));
        assert_eq!(derive_frame_targets("2997/100"), ("2997/100".to_string(), None));
        assert_eq!(derive_frame_targets("5994/100"), (FPS_30.to_string(), Some(FPS_60.to_string())));
        assert_eq!(derive_frame_targets("5993/100"), (FPS_30.to_string(), None));
        assert_eq!(derive_frame_targets("50/1"), (FPS_30.to_string(), None));
        assert_eq!(
            derive_frame_targets("60000/1001"),
            (FPS_30.to_string(), Some(FPS_60.to_string()))
        );
        assert_eq!(
            derive_frame_targets("60/1"),
            (FPS_30.to_string(), Some(FPS_60.to_string()))
        );
        assert_eq!(derive_frame_targets("garbage"), (FPS_30.to_string(), None));
        assert_eq!(derive_frame_targets("a/b"), (FPS_30.to_string(), None));
    }

    #[test]
    fn test_full_hd_sixty_with_high_frame_rate_enabled() {
        let targets = plan_renditions(&job(1920, 1080, "60000/1001"), true);
        assert_eq!(
            names(&targets),
            vec![
                "1920x1080_6000k_60",
                "1920x1080_3000k_30",
                "1280x720_2000k_30",
                "854x480_900k_30",
                "640x360_500k_30",
            ]
        );
        assert_eq!(targets[0].fps, FPS_60);
        assert!(targets[1..].iter().all(|t| t.fps == FPS_30));
    }

    #[test]
    fn test_high_frame_rate_disabled() {
        let targets = plan_renditions(&job(1920, 1080, "60/1"), false);
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0].file_name(), "1920x1080_3000k_30");
    }

    #[test]
    fn test_small_source() {
        let targets = plan_renditions(&job(640, 480, "25/1"), true);
        assert_eq!(names(&targets), vec!["854x480_900k_30", "640x360_500k_30"]);
        assert!(targets.iter().all(|t| t.fps == "25/1"));
    }

    #[test]
    fn test_ladder_nests_across_tiers() {
        let sizes = [(426, 240), (854, 480), (1280, 720), (1920, 1080)];
        let ladders: Vec<Vec<String>> = sizes
            .iter()
            .map(|&(w, h)| names(&plan_renditions(&job(w, h, "30/1"), false)))
            .collect();

        for pair in ladders.windows(2) {
            let (lower, higher) = (&pair[0], &pair[1]);
            assert!(higher.len() > lower.len());
            assert!(lower.iter().all(|name| higher.contains(name)));
        }
    }
}
