//! Manifest persistence and artifact upload
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


use cinder_config::StorageConfig;
use cinder_types::NewVideoIndexFile;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::database::TranscodeStore;
use crate::error::{PipelineError, Result};
use crate::job::TranscodingJob;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::storage::{object_key, ObjectStore};

/// Uploads in flight at once
pub const UPLOAD_WORKERS: usize = 10;

/// The raw upload, published only when configured
pub const RAW_UPLOAD_FILE: &str = "upload.mp4";

/// Store a rendition's playlist as its manifest row
pub async fn write_manifest(
    store: &dyn TranscodeStore,
    job: &TranscodingJob,
    quality: &str,
    playlist: &Path,
) -> Result<()> {
    let content = tokio::fs::read_to_string(playlist).await.map_err(|e| {
        PipelineError::ManifestWrite(format!("failed to read {}: {}", playlist.display(), e))
    })?;

    let row = NewVideoIndexFile {
        resource_id: job.resource_id,
        quality: quality.to_string(),
        dir_name: job.dir_name.clone(),
        content,
    };

    let id = store
        .insert_index_file(&row)
        .await
        .map_err(|e| PipelineError::ManifestWrite(e.to_string()))?;

    debug!(
        resource_id = job.resource_id,
        quality = quality,
        index_file_id = id,
        "Manifest row written"
    );
    Ok(())
}

/// Delete a rendition's intermediate stream and local playlist.
/// Failures are logged and otherwise ignored.
pub async fn remove_intermediates(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove intermediate file");
        }
    }
}

/// Per-file upload tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// How the publish phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Local storage, nothing to upload
    Local,
    /// Every file was attempted; individual failures are in the summary
    Uploaded(UploadSummary),
    /// The phase itself broke down
    Faulted(String),
}

impl PublishOutcome {
    /// A faulted publish fails the resource regardless of renditions
    pub fn forces_failure(&self) -> bool {
        matches!(self, PublishOutcome::Faulted(_))
    }

    pub fn files_uploaded(&self) -> usize {
        match self {
            PublishOutcome::Uploaded(summary) => summary.uploaded,
            _ => 0,
        }
    }
}

#[derive(Debug)]
enum FileResult {
    Uploaded,
    Failed,
    Skipped,
}

struct UploadTask {
    index: usize,
    file_name: String,
    path: PathBuf,
}

/// Uploads a job's output directory through a fixed worker pool
pub struct Publisher {
    object_store: Arc<dyn ObjectStore>,
    storage: StorageConfig,
    retry: RetryConfig,
    workers: usize,
}

impl Publisher {
    pub fn new(object_store: Arc<dyn ObjectStore>, storage: StorageConfig) -> Self {
        Self {
            object_store,
            storage,
            retry: RetryConfig::upload(),
            workers: UPLOAD_WORKERS,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Publish every file in `output_dir` under `video/{dir_name}/`
    pub async fn publish(&self, dir_name: &str, output_dir: &Path) -> PublishOutcome {
        if self.storage.is_local() {
            info!(dir_name = dir_name, "Local storage, skipping upload");
            return PublishOutcome::Local;
        }

        let files = match list_files(output_dir).await {
            Ok(files) => files,
            Err(e) => {
                error!(
                    output_dir = %output_dir.display(),
                    error = %e,
                    "Failed to list output directory"
                );
                return PublishOutcome::Faulted(format!("listing {}: {}", output_dir.display(), e));
            }
        };

        info!(
            dir_name = dir_name,
            backend = self.object_store.backend(),
            files = files.len(),
            workers = self.workers,
            "Uploading artifacts"
        );

        match self.upload_files(dir_name, files).await {
            Ok(summary) => {
                info!(
                    dir_name = dir_name,
                    uploaded = summary.uploaded,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "Upload finished"
                );
                PublishOutcome::Uploaded(summary)
            }
            Err(e) => {
                error!(dir_name = dir_name, error = %e, "Upload pool faulted");
                PublishOutcome::Faulted(e.to_string())
            }
        }
    }

    async fn upload_files(&self, dir_name: &str, files: Vec<(String, PathBuf)>) -> Result<UploadSummary> {
        let total = files.len();

        // Queue everything up front, then close the channel so workers drain and exit
        let (task_tx, task_rx) = mpsc::channel::<UploadTask>(total.max(1));
        for (index, (file_name, path)) in files.into_iter().enumerate() {
            task_tx
                .send(UploadTask { index, file_name, path })
                .await
                .map_err(|e| PipelineError::Publish(format!("task queue closed: {}", e)))?;
        }
        drop(task_tx);

        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<FileResult>(total.max(1));

        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                let task_rx = Arc::clone(&task_rx);
                let result_tx = result_tx.clone();
                let object_store = Arc::clone(&self.object_store);
                let retry = self.retry.clone();
                let dir_name = dir_name.to_string();
                let upload_raw = self.storage.upload_mp4_file;

                tokio::spawn(async move {
                    loop {
                        let task = { task_rx.lock().await.recv().await };
                        let Some(task) = task else { break };

                        let result = if task.file_name == RAW_UPLOAD_FILE && !upload_raw {
                            debug!(worker_id, file = %task.file_name, "Skipping raw upload");
                            FileResult::Skipped
                        } else {
                            upload_one(&object_store, &retry, &dir_name, &task, total, worker_id).await
                        };

                        if result_tx.send(result).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(result_tx);

        let mut fault = None;
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Upload worker aborted");
                fault.get_or_insert_with(|| e.to_string());
            }
        }
        if let Some(e) = fault {
            return Err(PipelineError::Publish(format!("upload worker aborted: {}", e)));
        }

        let mut summary = UploadSummary::default();
        while let Some(result) = result_rx.recv().await {
            match result {
                FileResult::Uploaded => summary.uploaded += 1,
                FileResult::Failed => summary.failed += 1,
                FileResult::Skipped => summary.skipped += 1,
            }
        }
        Ok(summary)
    }
}

async fn upload_one(
    object_store: &Arc<dyn ObjectStore>,
    retry: &RetryConfig,
    dir_name: &str,
    task: &UploadTask,
    total: usize,
    worker_id: usize,
) -> FileResult {
    let key = object_key(dir_name, &task.file_name);
    debug!(
        worker_id,
        progress = format!("{}/{}", task.index + 1, total),
        key = %key,
        "Uploading file"
    );

    let result = retry_with_backoff(retry, || {
        let object_store = Arc::clone(object_store);
        let key = key.clone();
        let path = task.path.clone();
        Box::pin(async move { object_store.put_object(&key, &path).await })
    })
    .await;

    match result {
        Ok(()) => FileResult::Uploaded,
        Err(e) => {
            error!(key = %key, error = %e, "Upload failed after retry");
            FileResult::Failed
        }
    }
}

/// Non-directory entries of `dir`, sorted by name
async fn list_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
    }

    files.sort();
    Ok(files)
}
