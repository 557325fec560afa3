//! Health Check HTTP Server
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


use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::coordinator::TranscodeCoordinator;
use crate::worker::SERVICE_NAME;

/// Health check server state
pub struct HealthServer {
    port: u16,
    coordinator: Arc<TranscodeCoordinator>,
}

impl HealthServer {
    pub fn new(port: u16, coordinator: Arc<TranscodeCoordinator>) -> Self {
        Self { port, coordinator }
    }

    pub fn router(coordinator: Arc<TranscodeCoordinator>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/api/health", get(health_check))
            .with_state(coordinator)
    }

    /// Start the health check server
    pub async fn start(self) -> anyhow::Result<()> {
        let app = Self::router(self.coordinator);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind health check server to {}: {}", addr, e))?;

        info!(port = self.port, "Health check server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Health check server error: {}", e))?;

        info!("Health check server stopped");
        Ok(())
    }
}

/// Service status plus GPU breaker and slot usage
pub async fn health_check(
    State(coordinator): State<Arc<TranscodeCoordinator>>,
) -> Json<serde_json::Value> {
    let gpu = coordinator.breaker().snapshot().await;

    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "gpu": {
            "enabled": coordinator.use_gpu(),
            "available": gpu.available,
            "consecutive_failures": gpu.consecutive_failures,
        },
        "slots": {
            "available": coordinator.available_slots(),
            "max": coordinator.max_slots(),
        },
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}
