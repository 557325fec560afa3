//! Media Transcoder
//!
//! Consumes `transcode.requested` events from the message bus and turns each
//! uploaded resource into an HLS rendition ladder:
//! - Probes the source and plans renditions
//! - Encodes renditions concurrently, on the GPU when available
//! - Segments each rendition and records its playlist
//! - Uploads produced files to object storage
//! - Settles resource and video status, then publishes `transcode.completed`
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


use anyhow::Result;
use cinder_bus::NatsClient;
use cinder_config::AppConfig;
use cinder_logging::LogFormat;
use media_transcoder::{
    cache::{NoopVideoCache, RedisVideoCache, VideoCache},
    coordinator::TranscodeCoordinator,
    database::{MemoryStore, PgTranscodeStore, TranscodeStore},
    ffmpeg::ProcessRunner,
    health::HealthServer,
    pipeline::{Pipeline, PipelineSettings},
    publisher::Publisher,
    storage::{LocalObjectStore, ObjectStore, S3ObjectStore},
    worker::{TranscodeWorker, SERVICE_NAME},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// How long in-flight jobs may run after a shutdown signal
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    cinder_logging::init(
        SERVICE_NAME,
        config.log_level(),
        LogFormat::from_setting(config.log_format.as_deref()),
    );

    info!("Starting Media Transcoder");
    info!(
        message_bus_url = config.message_bus_url(),
        use_gpu = config.transcoding.use_gpu,
        generate_1080p60 = config.transcoding.generate_1080p60,
        oss_type = %config.storage.oss_type,
        "Configuration loaded"
    );

    let store: Arc<dyn TranscodeStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(
            PgTranscodeStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?,
        ),
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let cache: Arc<dyn VideoCache> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisVideoCache::new(url)
                .map_err(|e| anyhow::anyhow!("Invalid REDIS_URL: {}", e))?,
        ),
        None => {
            info!("REDIS_URL not set, cache invalidation disabled");
            Arc::new(NoopVideoCache)
        }
    };

    let object_store: Arc<dyn ObjectStore> = match config.storage.object_storage.as_ref() {
        Some(storage) if !config.storage.is_local() => Arc::new(
            S3ObjectStore::new(storage)
                .map_err(|e| anyhow::anyhow!("Failed to create object storage client: {}", e))?,
        ),
        _ => Arc::new(LocalObjectStore),
    };

    let coordinator = Arc::new(TranscodeCoordinator::new(config.transcoding.use_gpu));
    let runner = Arc::new(ProcessRunner::new(
        config.transcoding.ffmpeg_path.clone(),
        config.transcoding.ffprobe_path.clone(),
    ));

    let pipeline = Arc::new(Pipeline::new(
        runner,
        Arc::clone(&coordinator),
        store,
        cache,
        Publisher::new(object_store, config.storage.clone()),
        PipelineSettings {
            generate_1080p60: config.transcoding.generate_1080p60,
        },
    ));

    // Start health check server in background
    let health_server = HealthServer::new(config.health_check_port, Arc::clone(&coordinator));
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.start().await {
            error!(error = %e, "Health check server error");
        }
    });

    // Connect to message bus
    let message_bus = NatsClient::new(
        config.message_bus_url(),
        config.message_bus.subject_prefix.clone(),
        Some(SERVICE_NAME.to_string()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to connect to message bus: {}", e))?;

    info!("Connected to message bus");

    let worker = TranscodeWorker::new(Arc::new(message_bus), pipeline);

    info!("Starting event processing");
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            error!(error = %e, "Worker error");
        }
    });

    info!("Media Transcoder running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    info!("Waiting for in-flight transcodes to complete...");
    tokio::select! {
        _ = tokio::time::sleep(SHUTDOWN_DRAIN) => {
            warn!("Shutdown timeout reached, forcing shutdown");
        }
        _ = worker_handle => {
            info!("Worker completed gracefully");
        }
    }

    health_handle.abort();
    info!("Media Transcoder stopped");

    Ok(())
}
