//! Transcoding Worker
//!
//! Consumes `video-transcoding` jobs from the queue and for each one:
//! - Downloads the original upload
//! - Transcodes it to a single-rendition HLS bundle
//! - Uploads the bundle and flips the video to COMPLETED or FAILED
//! - Publishes `video.transcoded` / `video.transcoding_failed` events
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
use coursecast_config::AppConfig;
use coursecast_logging::init_from_format;
use job_queue_client::nats::NatsJobQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use transcoding_worker::health::{self, HealthServer};
use transcoding_worker::{
    FfmpegTranscoder, InMemoryVideoRepository, LocalStorage, PostgresVideoRepository,
    S3Storage, StorageGateway, TranscodingWorker, VideoProcessor, VideoRepository,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_from_format("transcoding-worker", config.log_level(), config.log_format());

    info!(environment = ?config.environment, "Starting Transcoding Worker");

    let storage: Arc<dyn StorageGateway> = match (&config.object_storage, &config.local_storage_root) {
        (Some(storage_config), _) => Arc::new(S3Storage::new(storage_config)?),
        (None, Some(root)) => {
            warn!(root = %root.display(), "Object storage not configured, using local storage");
            Arc::new(LocalStorage::new(root.clone()))
        }
        (None, None) => {
            error!("Object storage configuration is required for transcoding");
            return Err(anyhow::anyhow!(
                "Missing OBJECT_STORAGE_* or LOCAL_STORAGE_ROOT environment variables"
            ));
        }
    };

    let repository: Arc<dyn VideoRepository> = match &config.database_url {
        Some(url) => Arc::new(PostgresVideoRepository::connect(url).await?),
        None if config.environment.is_production() => {
            return Err(anyhow::anyhow!("DATABASE_URL is required in production"));
        }
        None => {
            warn!("DATABASE_URL not configured, video state is kept in memory");
            Arc::new(InMemoryVideoRepository::new())
        }
    };

    tokio::fs::create_dir_all(&config.transcode.work_dir).await?;

    info!(
        message_bus_url = config.message_bus_url(),
        storage = storage.backend_name(),
        work_dir = %config.transcode.work_dir.display(),
        "Configuration loaded"
    );

    // Connect to the job queue
    let queue = NatsJobQueue::new(
        config.message_bus_url(),
        config.message_bus.stream_name.clone(),
        config.message_bus.max_deliver,
        Duration::from_secs(config.message_bus.ack_wait_secs),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to connect to job queue: {}", e))?;

    info!("Connected to job queue");

    let processor = VideoProcessor::new(
        Arc::clone(&storage),
        Arc::clone(&repository),
        Arc::new(FfmpegTranscoder::new(&config.transcode)),
        config.transcode.work_dir.clone(),
    );
    let worker = TranscodingWorker::new(Arc::new(queue), processor, repository);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start health check server in background
    let health_server = HealthServer::new(config.health_check_port, worker.stats());
    let health_shutdown = shutdown_rx.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.start(health_shutdown).await {
            error!(error = %e, "Health check server error");
        }
    });

    // Start processing jobs
    info!("Starting job processing");
    let mut worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(shutdown_rx).await {
            error!(error = %e, "Worker error");
        }
    });

    info!("Transcoding Worker running. Press Ctrl+C to stop.");
    tokio::select! {
        _ = health::shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        _ = &mut worker_handle => {
            warn!("Worker stopped on its own");
        }
    }

    let _ = shutdown_tx.send(true);

    // Graceful shutdown: give the in-flight job time to finish
    if !worker_handle.is_finished() {
        info!("Waiting for in-flight job to complete...");
        tokio::select! {
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                warn!("Shutdown timeout reached, forcing shutdown");
                worker_handle.abort();
            }
            _ = &mut worker_handle => {
                info!("Worker completed gracefully");
            }
        }
    }

    let _ = health_handle.await;
    info!("Transcoding Worker stopped");

    Ok(())
}
