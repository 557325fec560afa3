//! Fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cinder_config::StorageConfig;
use cinder_types::{Resource, Status, TranscodeRequestedPayload, Video};
use media_transcoder::cache::VideoCache;
use media_transcoder::database::MemoryStore;
use media_transcoder::error::{PipelineError, Result};
use media_transcoder::ffmpeg::{CommandOutput, CommandRunner, Tool};
use media_transcoder::storage::ObjectStore;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const VIDEO_ID: i64 = 1;
pub const RESOURCE_ID: i64 = 10;

pub fn probe_json(width: u32, height: u32, avg_frame_rate: &str) -> String {
    format!(
        r#"{{"streams":[{{"index":0,"codec_name":"h264","width":{},"height":{},"duration":"12.5","avg_frame_rate":"{}"}}],"format":{{"format_name":"mov,mp4"}}}}"#,
        width, height, avg_frame_rate
    )
}

fn ok(stdout: String) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout,
        stderr: String::new(),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Stands in for ffmpeg/ffprobe and writes the files they would produce
pub struct FakeRunner {
    probe_output: Mutex<Option<String>>,
    /// Accelerated encodes left to fail, and the stderr they fail with
    gpu_failures: AtomicUsize,
    gpu_error: &'static str,
    /// Renditions whose encode fails in every mode, matched on output name
    failing_renditions: Mutex<HashSet<String>>,
    encode_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub gpu_attempts: AtomicUsize,
    pub software_attempts: AtomicUsize,
    pub covers: AtomicUsize,
}

impl FakeRunner {
    pub fn new(width: u32, height: u32, avg_frame_rate: &str) -> Self {
        Self {
            probe_output: Mutex::new(Some(probe_json(width, height, avg_frame_rate))),
            gpu_failures: AtomicUsize::new(0),
            gpu_error: "[h264_nvenc @ 0x55] No NVENC capable devices found",
            failing_renditions: Mutex::new(HashSet::new()),
            encode_delay: Duration::from_millis(20),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gpu_attempts: AtomicUsize::new(0),
            software_attempts: AtomicUsize::new(0),
            covers: AtomicUsize::new(0),
        }
    }

    /// ffprobe exits non-zero
    pub fn failing_probe(self) -> Self {
        *self.probe_output.lock().unwrap() = None;
        self
    }

    pub fn with_gpu_failures(self, count: usize) -> Self {
        self.gpu_failures.store(count, Ordering::SeqCst);
        self
    }

    /// GPU encodes fail with an ordinary ffmpeg error, not a device one
    pub fn with_generic_gpu_failures(mut self, count: usize) -> Self {
        self.gpu_error = "Error while opening encoder: Invalid argument";
        self.gpu_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_failing_rendition(self, name: &str) -> Self {
        self.failing_renditions.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn encode(&self, args: &[String]) -> CommandOutput {
        let accelerated = args.iter().any(|a| a == "h264_nvenc");
        if accelerated {
            self.gpu_attempts.fetch_add(1, Ordering::SeqCst);
        } else {
            self.software_attempts.fetch_add(1, Ordering::SeqCst);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.encode_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let output = PathBuf::from(args.last().cloned().unwrap_or_default());
        let name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if accelerated {
            let remaining = self.gpu_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.gpu_failures.store(remaining - 1, Ordering::SeqCst);
                return failed(self.gpu_error);
            }
        }

        if self.failing_renditions.lock().unwrap().contains(&name) {
            return failed("Conversion failed!");
        }

        tokio::fs::write(&output, b"\x47\x40\x00\x10").await.unwrap();
        ok(String::new())
    }

    async fn segment(&self, args: &[String]) -> CommandOutput {
        let playlist = value_after(args, "-segment_list").unwrap().to_string();
        let pattern = args.last().unwrap().clone();

        let mut content = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
        for i in 0..2 {
            let segment = pattern.replace("%05d", &format!("{:05}", i));
            tokio::fs::write(&segment, b"\x47").await.unwrap();
            let file_name = Path::new(&segment).file_name().unwrap().to_string_lossy().into_owned();
            content.push_str(&format!("#EXTINF:10.0,\n{}\n", file_name));
        }
        content.push_str("#EXT-X-ENDLIST\n");
        tokio::fs::write(&playlist, content).await.unwrap();

        ok(String::new())
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, tool: Tool, args: &[String]) -> std::io::Result<CommandOutput> {
        match tool {
            Tool::Ffprobe => Ok(match self.probe_output.lock().unwrap().clone() {
                Some(json) => ok(json),
                None => failed("Invalid data found when processing input"),
            }),
            Tool::Ffmpeg if args.iter().any(|a| a == "segment") => Ok(self.segment(args).await),
            Tool::Ffmpeg if args.iter().any(|a| a == "-vframes") => {
                self.covers.fetch_add(1, Ordering::SeqCst);
                tokio::fs::write(args.last().unwrap(), b"\xff\xd8").await?;
                Ok(ok(String::new()))
            }
            Tool::Ffmpeg => Ok(self.encode(args).await),
        }
    }
}

/// Object store that records what it was asked to upload
#[derive(Default)]
pub struct RecordingStore {
    delay: Duration,
    /// File names failing on their first attempt only
    flaky: HashSet<String>,
    /// File names failing on every attempt
    broken: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    uploaded: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn flaky(mut self, file_name: &str) -> Self {
        self.flaky.insert(file_name.to_string());
        self
    }

    pub fn broken(mut self, file_name: &str) -> Self {
        self.broken.insert(file_name.to_string());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn uploaded(&self) -> Vec<String> {
        let mut keys = self.uploaded.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.broken.contains(&file_name) || (attempt == 1 && self.flaky.contains(&file_name)) {
            return Err(PipelineError::Upload(format!("put {}: connection reset", key)));
        }

        self.uploaded.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn backend(&self) -> &str {
        "recording"
    }
}

/// Remembers which videos were invalidated
#[derive(Default)]
pub struct RecordingCache {
    invalidated: Mutex<Vec<i64>>,
}

impl RecordingCache {
    pub fn invalidated(&self) -> Vec<i64> {
        self.invalidated.lock().unwrap().clone()
    }
}

impl VideoCache for RecordingCache {
    fn invalidate(&self, video_id: i64) {
        self.invalidated.lock().unwrap().push(video_id);
    }
}

pub fn local_storage() -> StorageConfig {
    StorageConfig {
        oss_type: "local".to_string(),
        upload_mp4_file: false,
        object_storage: None,
    }
}

pub fn remote_storage(upload_mp4_file: bool) -> StorageConfig {
    StorageConfig {
        oss_type: "s3".to_string(),
        upload_mp4_file,
        object_storage: None,
    }
}

/// A processing video with one processing resource per id
pub async fn seeded_store(resource_ids: &[i64]) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_video(Video {
            id: VIDEO_ID,
            status: Status::Processing,
        })
        .await;
    for id in resource_ids {
        store
            .insert_resource(Resource {
                id: *id,
                vid: VIDEO_ID,
                status: Status::Processing,
            })
            .await;
    }
    store
}

pub fn request(dir: &Path) -> TranscodeRequestedPayload {
    TranscodeRequestedPayload {
        video_id: VIDEO_ID,
        resource_id: RESOURCE_ID,
        input_file: dir.join("upload.mp4").to_string_lossy().into_owned(),
        output_dir: format!("{}/", dir.display()),
        dir_name: "a1b2c3".to_string(),
        cover_file: None,
    }
}
