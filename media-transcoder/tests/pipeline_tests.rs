//! Transcoding Pipeline Tests

mod common;

use async_trait::async_trait;
use cinder_types::{NewVideoIndexFile, Status};
use common::*;
use media_transcoder::coordinator::TranscodeCoordinator;
use media_transcoder::database::{MemoryStore, StatusTransaction, StoreResult, TranscodeStore};
use media_transcoder::error::PipelineError;
use media_transcoder::storage::{LocalObjectStore, ObjectStore};
use media_transcoder::{Pipeline, PipelineSettings, PublishOutcome, Publisher, UploadSummary};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    runner: Arc<FakeRunner>,
    coordinator: Arc<TranscodeCoordinator>,
    store: Arc<MemoryStore>,
    cache: Arc<RecordingCache>,
    pipeline: Pipeline,
}

async fn harness(
    runner: FakeRunner,
    coordinator: TranscodeCoordinator,
    generate_1080p60: bool,
    publisher: impl FnOnce() -> Publisher,
) -> Harness {
    let runner = Arc::new(runner);
    let coordinator = Arc::new(coordinator);
    let store = Arc::new(seeded_store(&[RESOURCE_ID]).await);
    let cache = Arc::new(RecordingCache::default());

    let pipeline = Pipeline::new(
        runner.clone(),
        coordinator.clone(),
        store.clone(),
        cache.clone(),
        publisher(),
        PipelineSettings { generate_1080p60 },
    );

    Harness {
        runner,
        coordinator,
        store,
        cache,
        pipeline,
    }
}

fn local_publisher() -> Publisher {
    Publisher::new(Arc::new(LocalObjectStore), local_storage())
}

async fn qualities(store: &MemoryStore) -> Vec<String> {
    let mut names: Vec<_> = store
        .index_files(RESOURCE_ID)
        .await
        .into_iter()
        .map(|f| f.quality)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_ntsc_60_source_gets_five_renditions() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1920, 1080, "60000/1001"),
        TranscodeCoordinator::new(false),
        true,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_total, 5);
    assert_eq!(outcome.renditions_succeeded, 5);
    assert_eq!(outcome.publish, PublishOutcome::Local);
    assert_eq!(
        qualities(&h.store).await,
        vec![
            "1280x720_2000k_30",
            "1920x1080_3000k_30",
            "1920x1080_6000k_60",
            "640x360_500k_30",
            "854x480_900k_30",
        ]
    );

    assert_eq!(outcome.completion.resource_status, Status::WaitingReview);
    assert_eq!(outcome.completion.video_status, Some(Status::WaitingReview));
    assert_eq!(h.store.video(VIDEO_ID).await.unwrap().status, Status::WaitingReview);
    assert_eq!(h.cache.invalidated(), vec![VIDEO_ID]);
}

#[tokio::test]
async fn test_small_source_gets_lower_tiers_only() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(640, 480, "30/1"),
        TranscodeCoordinator::new(false),
        true,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_total, 2);
    assert_eq!(qualities(&h.store).await, vec!["640x360_500k_30", "854x480_900k_30"]);
}

#[tokio::test]
async fn test_intermediates_removed_segments_kept() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(640, 360, "25/1"),
        TranscodeCoordinator::new(false),
        false,
        local_publisher,
    )
    .await;

    h.pipeline.run(&request(dir.path())).await.unwrap();

    let rows = h.store.index_files(RESOURCE_ID).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].content.starts_with("#EXTM3U"));
    assert_eq!(rows[0].dir_name, "a1b2c3");

    assert!(!dir.path().join("640x360_500k_30.ts").exists());
    assert!(!dir.path().join("640x360_500k_30.m3u8").exists());
    assert!(dir.path().join("640x360_500k_30_00000.ts").exists());
    assert!(dir.path().join("640x360_500k_30_00001.ts").exists());
}

#[tokio::test]
async fn test_encodes_bounded_by_slots() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1920, 1080, "30/1"),
        TranscodeCoordinator::new(false),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_succeeded, 4);
    assert!(h.runner.max_in_flight() <= 2);
    assert_eq!(h.coordinator.available_slots(), 2);
}

#[tokio::test]
async fn test_three_gpu_failures_disable_acceleration() {
    let dir = tempfile::tempdir().unwrap();
    // One slot keeps renditions sequential
    let h = harness(
        FakeRunner::new(1920, 1080, "30/1").with_gpu_failures(usize::MAX),
        TranscodeCoordinator::with_slots(1, true),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    // Every rendition still lands through the software fallback
    assert_eq!(outcome.renditions_succeeded, 4);
    assert_eq!(h.runner.gpu_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 4);

    let breaker = h.coordinator.breaker().snapshot().await;
    assert!(!breaker.available);
    assert_eq!(breaker.consecutive_failures, 3);

    // A later job never tries the GPU again
    h.pipeline.run(&request(dir.path())).await.unwrap();
    assert_eq!(h.runner.gpu_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_gpu_success_resets_failures() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1920, 1080, "30/1").with_gpu_failures(2),
        TranscodeCoordinator::with_slots(1, true),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_succeeded, 4);
    assert_eq!(h.runner.gpu_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 2);

    let breaker = h.coordinator.breaker().snapshot().await;
    assert!(breaker.available);
    assert_eq!(breaker.consecutive_failures, 0);
}

#[tokio::test]
async fn test_ordinary_gpu_errors_leave_breaker_closed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1920, 1080, "30/1").with_generic_gpu_failures(usize::MAX),
        TranscodeCoordinator::with_slots(1, true),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    // Each rendition tries the GPU, then lands in software
    assert_eq!(outcome.renditions_succeeded, 4);
    assert_eq!(h.runner.gpu_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 4);

    let breaker = h.coordinator.breaker().snapshot().await;
    assert!(breaker.available);
    assert_eq!(breaker.consecutive_failures, 0);
}

#[tokio::test]
async fn test_rendition_failing_on_both_encoders_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1280, 720, "30/1").with_failing_rendition("854x480_900k_30"),
        TranscodeCoordinator::with_slots(1, true),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_total, 3);
    assert_eq!(outcome.renditions_succeeded, 2);
    assert_eq!(h.runner.gpu_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(qualities(&h.store).await, vec!["1280x720_2000k_30", "640x360_500k_30"]);
    assert_eq!(outcome.completion.resource_status, Status::WaitingReview);
    assert!(h.coordinator.breaker().snapshot().await.available);
}

#[tokio::test]
async fn test_failed_rendition_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(1280, 720, "30/1").with_failing_rendition("854x480_900k_30"),
        TranscodeCoordinator::new(false),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_total, 3);
    assert_eq!(outcome.renditions_succeeded, 2);
    assert_eq!(qualities(&h.store).await, vec!["1280x720_2000k_30", "640x360_500k_30"]);
    assert_eq!(outcome.completion.resource_status, Status::WaitingReview);
}

#[tokio::test]
async fn test_all_renditions_failed_fails_resource() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(640, 480, "30/1")
            .with_failing_rendition("854x480_900k_30")
            .with_failing_rendition("640x360_500k_30"),
        TranscodeCoordinator::new(false),
        false,
        local_publisher,
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(outcome.renditions_succeeded, 0);
    assert_eq!(outcome.completion.resource_status, Status::ProcessingFail);
    assert_eq!(outcome.completion.video_status, Some(Status::ProcessingFail));
    assert_eq!(
        h.store.resource(RESOURCE_ID).await.unwrap().status,
        Status::ProcessingFail
    );
}

#[tokio::test]
async fn test_probe_failure_aborts_job() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        FakeRunner::new(640, 480, "30/1").failing_probe(),
        TranscodeCoordinator::new(false),
        false,
        local_publisher,
    )
    .await;

    let err = h.pipeline.run(&request(dir.path())).await.unwrap_err();

    assert!(matches!(err, PipelineError::Probe(_)));
    assert_eq!(h.runner.software_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.store.resource(RESOURCE_ID).await.unwrap().status,
        Status::Processing
    );
    assert!(h.cache.invalidated().is_empty());
}

#[tokio::test]
async fn test_remote_storage_uploads_segments() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("upload.mp4"), b"raw").await.unwrap();

    let object_store = Arc::new(RecordingStore::new(Duration::from_millis(5)));
    let publisher_store: Arc<dyn ObjectStore> = object_store.clone();
    let h = harness(
        FakeRunner::new(640, 480, "30/1"),
        TranscodeCoordinator::new(false),
        false,
        move || Publisher::new(publisher_store, remote_storage(false)),
    )
    .await;

    let outcome = h.pipeline.run(&request(dir.path())).await.unwrap();

    assert_eq!(
        outcome.publish,
        PublishOutcome::Uploaded(UploadSummary {
            uploaded: 4,
            failed: 0,
            skipped: 1,
        })
    );
    assert_eq!(
        object_store.uploaded(),
        vec![
            "video/a1b2c3/640x360_500k_30_00000.ts",
            "video/a1b2c3/640x360_500k_30_00001.ts",
            "video/a1b2c3/854x480_900k_30_00000.ts",
            "video/a1b2c3/854x480_900k_30_00001.ts",
        ]
    );
    assert_eq!(object_store.attempts("video/a1b2c3/upload.mp4"), 0);
    assert_eq!(outcome.completion.resource_status, Status::WaitingReview);
}

/// Drops the output directory as soon as a manifest row lands
struct VanishingDirStore {
    inner: Arc<MemoryStore>,
    dir: PathBuf,
}

#[async_trait]
impl TranscodeStore for VanishingDirStore {
    async fn insert_index_file(&self, file: &NewVideoIndexFile) -> StoreResult<i64> {
        let id = self.inner.insert_index_file(file).await?;
        let _ = tokio::fs::remove_dir_all(&self.dir).await;
        Ok(id)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StatusTransaction + '_>> {
        self.inner.begin().await
    }

    fn backend(&self) -> &'static str {
        "vanishing"
    }
}

#[tokio::test]
async fn test_publish_fault_forces_failure() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("job");
    tokio::fs::create_dir(&dir).await.unwrap();

    let inner = Arc::new(seeded_store(&[RESOURCE_ID]).await);
    let store = Arc::new(VanishingDirStore {
        inner: inner.clone(),
        dir: dir.clone(),
    });
    let pipeline = Pipeline::new(
        Arc::new(FakeRunner::new(640, 360, "30/1")),
        Arc::new(TranscodeCoordinator::new(false)),
        store,
        Arc::new(RecordingCache::default()),
        Publisher::new(Arc::new(RecordingStore::default()), remote_storage(false)),
        PipelineSettings::default(),
    );

    let outcome = pipeline.run(&request(&dir)).await.unwrap();

    // The manifest row exists, but the listing failure still fails the resource
    assert_eq!(outcome.renditions_succeeded, 1);
    assert_eq!(inner.index_files(RESOURCE_ID).await.len(), 1);
    assert!(matches!(outcome.publish, PublishOutcome::Faulted(_)));
    assert_eq!(outcome.completion.resource_status, Status::ProcessingFail);
    assert_eq!(outcome.completion.video_status, Some(Status::ProcessingFail));
}

#[tokio::test]
async fn test_unseeded_store_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        Arc::new(FakeRunner::new(854, 480, "30/1")),
        Arc::new(TranscodeCoordinator::new(false)),
        store.clone(),
        Arc::new(RecordingCache::default()),
        local_publisher(),
        PipelineSettings::default(),
    );

    let outcome = pipeline.run(&request(dir.path())).await.unwrap();

    // No resource or video rows exist, so nothing is updated but the job settles
    assert_eq!(outcome.renditions_succeeded, outcome.renditions_total);
    assert_eq!(store.index_files(RESOURCE_ID).await.len(), 2);
    assert_eq!(outcome.completion.resource_status, Status::WaitingReview);
    assert_eq!(outcome.completion.video_rows_updated, 0);
    assert!(store.resource(RESOURCE_ID).await.is_none());
}
