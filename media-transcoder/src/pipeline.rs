//! End-to-end transcoding of one uploaded resource
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


use cinder_types::{Status, TranscodeRequestedPayload};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::VideoCache;
use crate::completion::{CompletionReport, JobStateMachine};
use crate::coordinator::TranscodeCoordinator;
use crate::database::TranscodeStore;
use crate::error::Result;
use crate::ffmpeg::CommandRunner;
use crate::job::TranscodingJob;
use crate::ladder::{plan_renditions, RenditionTarget};
use crate::probe::probe;
use crate::publisher::{remove_intermediates, write_manifest, PublishOutcome, Publisher};
use crate::segmenter::segment;
use crate::transcode::Transcoder;

/// Per-process pipeline options
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSettings {
    pub generate_1080p60: bool,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub renditions_total: usize,
    pub renditions_succeeded: usize,
    pub publish: PublishOutcome,
    pub completion: CompletionReport,
}

/// Shared by every rendition task of every job
#[derive(Clone)]
struct RenditionStages {
    runner: Arc<dyn CommandRunner>,
    coordinator: Arc<TranscodeCoordinator>,
    transcoder: Arc<Transcoder>,
    store: Arc<dyn TranscodeStore>,
}

/// Probe, fan out renditions, publish, then settle statuses
pub struct Pipeline {
    stages: RenditionStages,
    publisher: Publisher,
    state_machine: JobStateMachine,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        coordinator: Arc<TranscodeCoordinator>,
        store: Arc<dyn TranscodeStore>,
        cache: Arc<dyn VideoCache>,
        publisher: Publisher,
        settings: PipelineSettings,
    ) -> Self {
        let transcoder = Arc::new(Transcoder::new(Arc::clone(&runner), Arc::clone(&coordinator)));
        let state_machine = JobStateMachine::new(Arc::clone(&store), cache);

        Self {
            stages: RenditionStages {
                runner,
                coordinator,
                transcoder,
                store,
            },
            publisher,
            state_machine,
            settings,
        }
    }

    pub fn coordinator(&self) -> &Arc<TranscodeCoordinator> {
        &self.stages.coordinator
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.stages.runner.as_ref()
    }

    /// Run the whole job.
    ///
    /// Rendition failures are absorbed and counted. Probe and status
    /// transaction failures are returned.
    pub async fn run(&self, request: &TranscodeRequestedPayload) -> Result<PipelineOutcome> {
        let input = std::path::Path::new(&request.input_file);
        let info = probe(self.stages.runner.as_ref(), input).await?;

        let job = Arc::new(TranscodingJob::new(request, info));
        let targets = plan_renditions(&job, self.settings.generate_1080p60);
        let renditions_total = targets.len();

        info!(
            video_id = job.video_id,
            resource_id = job.resource_id,
            width = job.width,
            height = job.height,
            codec = %job.codec_name,
            avg_frame_rate = %job.avg_frame_rate,
            fps = job.frame_rate.as_deref().unwrap_or("unknown"),
            renditions = renditions_total,
            "Starting transcode"
        );

        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let stages = self.stages.clone();
                let job = Arc::clone(&job);
                tokio::spawn(async move { stages.run_rendition(&job, &target).await })
            })
            .collect();

        let mut renditions_succeeded = 0;
        for joined in join_all(handles).await {
            match joined {
                Ok(true) => renditions_succeeded += 1,
                Ok(false) => {}
                Err(e) => error!(resource_id = job.resource_id, error = %e, "Rendition task aborted"),
            }
        }

        info!(
            resource_id = job.resource_id,
            succeeded = renditions_succeeded,
            total = renditions_total,
            "Renditions finished"
        );

        let publish = self.publisher.publish(&job.dir_name, &job.output_dir).await;

        let requested = if publish.forces_failure() {
            Status::ProcessingFail
        } else {
            Status::WaitingReview
        };
        let completion = self
            .state_machine
            .complete(job.video_id, job.resource_id, requested)
            .await?;

        Ok(PipelineOutcome {
            renditions_total,
            renditions_succeeded,
            publish,
            completion,
        })
    }
}

impl RenditionStages {
    /// Encode, segment and record one rendition; true when its manifest row landed
    async fn run_rendition(&self, job: &TranscodingJob, target: &RenditionTarget) -> bool {
        let name = target.file_name();

        let _permit = match self.coordinator.acquire_slot().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(resource_id = job.resource_id, rendition = %name, error = %e, "No transcode slot");
                return false;
            }
        };

        let intermediate = job.output_path(&format!("{}.ts", name));
        if let Err(e) = self
            .transcoder
            .transcode(job.input(), &intermediate, target)
            .await
        {
            warn!(resource_id = job.resource_id, rendition = %name, error = %e, "Rendition encode failed");
            return false;
        }

        let playlist = match segment(self.runner.as_ref(), &intermediate, &job.output_dir, &name).await {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(resource_id = job.resource_id, rendition = %name, error = %e, "Rendition segment failed");
                return false;
            }
        };

        if let Err(e) = write_manifest(self.store.as_ref(), job, &name, &playlist).await {
            warn!(resource_id = job.resource_id, rendition = %name, error = %e, "Manifest write failed");
            return false;
        }

        remove_intermediates(&[intermediate.as_path(), playlist.as_path()]).await;
        true
    }
}
