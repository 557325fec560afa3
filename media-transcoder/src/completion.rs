//! Resource and video status reconciliation after a job
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


use cinder_types::{ResourceUpdate, Status, VideoUpdate};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::VideoCache;
use crate::database::{StatusTransaction, StoreResult, TranscodeStore};
use crate::error::Result;

/// What a completed transaction wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReport {
    /// Status written to the resource, after forcing
    pub resource_status: Status,
    /// Aggregate video status, when no sibling was still processing
    pub video_status: Option<Status>,
    /// Zero when the video already carried a review outcome
    pub video_rows_updated: u64,
}

/// Settles a resource and its video under one transaction
pub struct JobStateMachine {
    store: Arc<dyn TranscodeStore>,
    cache: Arc<dyn VideoCache>,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn TranscodeStore>, cache: Arc<dyn VideoCache>) -> Self {
        Self { store, cache }
    }

    /// Apply `requested` to the resource and roll the result up to its video.
    ///
    /// Any store error rolls the transaction back and is returned; statuses
    /// keep their prior values.
    pub async fn complete(
        &self,
        video_id: i64,
        resource_id: i64,
        requested: Status,
    ) -> Result<CompletionReport> {
        let mut tx = self.store.begin().await?;

        match settle(tx.as_mut(), video_id, resource_id, requested).await {
            Ok(report) => {
                tx.commit().await.map_err(|e| {
                    error!(video_id, resource_id, error = %e, "Status transaction commit failed");
                    e
                })?;

                info!(
                    video_id,
                    resource_id,
                    resource_status = report.resource_status.as_str(),
                    video_status = report.video_status.map(Status::as_str),
                    video_rows_updated = report.video_rows_updated,
                    "Job completed"
                );

                self.cache.invalidate(video_id);
                Ok(report)
            }
            Err(e) => {
                error!(video_id, resource_id, error = %e, "Status transaction failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(video_id, resource_id, error = %rollback_err, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }
}

async fn settle(
    tx: &mut (dyn StatusTransaction + '_),
    video_id: i64,
    resource_id: i64,
    requested: Status,
) -> StoreResult<CompletionReport> {
    let manifests = tx.count_index_files(resource_id).await?;
    let resource_status = if manifests == 0 {
        if requested != Status::ProcessingFail {
            warn!(
                video_id,
                resource_id,
                requested = requested.as_str(),
                "No manifest rows written, forcing processing failure"
            );
        }
        Status::ProcessingFail
    } else {
        requested
    };

    let resource_rows = tx
        .update_resource(resource_id, &ResourceUpdate::status(resource_status))
        .await?;
    if resource_rows == 0 {
        warn!(video_id, resource_id, "Resource row not found, status not recorded");
    }

    let still_processing = tx
        .count_resources(video_id, Some(Status::Processing))
        .await?;
    if still_processing > 0 {
        return Ok(CompletionReport {
            resource_status,
            video_status: None,
            video_rows_updated: 0,
        });
    }

    let total = tx.count_resources(video_id, None).await?;
    let failed = tx
        .count_resources(video_id, Some(Status::ProcessingFail))
        .await?;
    let video_status = if failed == total {
        Status::ProcessingFail
    } else {
        Status::WaitingReview
    };

    let video_rows_updated = tx
        .update_video_unless_reviewed(video_id, &VideoUpdate::status(video_status))
        .await?;
    if video_rows_updated == 0 {
        info!(video_id, "Video already reviewed, status left unchanged");
    }

    Ok(CompletionReport {
        resource_status,
        video_status: Some(video_status),
        video_rows_updated,
    })
}
