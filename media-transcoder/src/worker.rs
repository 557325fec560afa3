//! Transcode Worker - Event Processing
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


use cinder_bus::MessageBusClient;
use cinder_types::{Event, EventType, TranscodeCompletedPayload, TranscodeRequestedPayload};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::ffmpeg::extract_cover;
use crate::pipeline::Pipeline;

/// Source name stamped on published events
pub const SERVICE_NAME: &str = "media-transcoder";

/// Consumes transcode requests and reports their outcome
#[derive(Clone)]
pub struct TranscodeWorker {
    message_bus: Arc<dyn MessageBusClient>,
    pipeline: Arc<Pipeline>,
}

impl TranscodeWorker {
    pub fn new(message_bus: Arc<dyn MessageBusClient>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            message_bus,
            pipeline,
        }
    }

    /// Run the worker until the event stream ends.
    ///
    /// Jobs run concurrently and share the coordinator's slot pool. In-flight
    /// jobs are awaited before returning.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Subscribing to transcode.requested events");

        let mut event_stream = self.message_bus.subscribe(EventType::TranscodeRequested);
        let mut jobs = JoinSet::new();

        info!("Waiting for transcode requests...");

        loop {
            tokio::select! {
                next = event_stream.next() => match next {
                    Some(Ok(event)) => {
                        info!(
                            event_id = %event.event_id,
                            event_type = event.event_type.as_str(),
                            "Received transcode request"
                        );
                        let worker = self.clone();
                        jobs.spawn(async move {
                            if let Err(e) = worker.handle_event(&event).await {
                                error!(
                                    event_id = %event.event_id,
                                    error = %e,
                                    "Failed to process transcode request"
                                );
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Error receiving event from message bus");
                    }
                    None => break,
                },
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Transcode job aborted");
                    }
                }
            }
        }

        warn!(in_flight = jobs.len(), "Event stream ended");
        while let Some(joined) = jobs.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Transcode job aborted");
            }
        }
        Ok(())
    }

    /// Process one request and publish its completion event
    pub async fn handle_event(&self, event: &Event) -> anyhow::Result<TranscodeCompletedPayload> {
        let payload: TranscodeRequestedPayload = event
            .payload_as()
            .map_err(|e| anyhow::anyhow!("Invalid payload: {}", e))?;
        payload
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid payload: {}", e))?;

        info!(
            video_id = payload.video_id,
            resource_id = payload.resource_id,
            input_file = %payload.input_file,
            dir_name = %payload.dir_name,
            "Processing transcode request"
        );

        if let Some(cover) = payload.cover_file.as_deref() {
            // A missing cover never fails the job
            if let Err(e) =
                extract_cover(self.pipeline.runner(), Path::new(&payload.input_file), Path::new(cover)).await
            {
                warn!(resource_id = payload.resource_id, error = %e, "Cover extraction failed");
            }
        }

        let outcome = self.pipeline.run(&payload).await.map_err(|e| {
            error!(
                video_id = payload.video_id,
                resource_id = payload.resource_id,
                error = %e,
                "Transcode job failed"
            );
            anyhow::anyhow!(e)
        })?;

        let completed = TranscodeCompletedPayload {
            video_id: payload.video_id,
            resource_id: payload.resource_id,
            status: outcome.completion.resource_status,
            renditions_succeeded: outcome.renditions_succeeded,
            renditions_total: outcome.renditions_total,
            files_uploaded: outcome.publish.files_uploaded(),
        };
        self.publish_completed(&completed).await?;

        info!(
            video_id = completed.video_id,
            resource_id = completed.resource_id,
            status = completed.status.as_str(),
            "Transcode request completed"
        );
        Ok(completed)
    }

    async fn publish_completed(&self, payload: &TranscodeCompletedPayload) -> anyhow::Result<()> {
        let event = Event::new(EventType::TranscodeCompleted, SERVICE_NAME, payload)
            .map_err(|e| anyhow::anyhow!("Failed to create event: {}", e))?;

        self.message_bus
            .publish(&event)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
