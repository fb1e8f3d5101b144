//! Health check endpoint for the Transcoding Worker
//!
//! Provides HTTP health check endpoint for orchestration and monitoring.
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
use tokio::sync::watch;
use tracing::info;

use crate::worker::WorkerStats;

/// Health check server state
pub struct HealthServer {
    port: u16,
    stats: Arc<WorkerStats>,
}

impl HealthServer {
    /// Create a new health check server
    pub fn new(port: u16, stats: Arc<WorkerStats>) -> Self {
        Self { port, stats }
    }

    /// Start the health check server; stops when `shutdown` flips to `true`
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = router(self.stats);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind health check server to {}: {}", addr, e))?;

        info!(port = self.port, "Health check server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| anyhow::anyhow!("Health check server error: {}", e))?;

        info!("Health check server stopped");
        Ok(())
    }
}

pub fn router(stats: Arc<WorkerStats>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .with_state(stats)
}

/// Health check handler
async fn health_check(State(stats): State<Arc<WorkerStats>>) -> Json<serde_json::Value> {
    let snapshot = stats.snapshot();
    Json(json!({
        "status": "ok",
        "service": "transcoding-worker",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "jobsProcessed": snapshot.jobs_processed,
        "jobsFailed": snapshot.jobs_failed,
        "currentVideoId": snapshot.current_video_id,
    }))
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
