//! Transcoding Worker - queue consumption
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


use crate::processor::VideoProcessor;
use crate::repository::VideoRepository;
use coursecast_types::{
    Event, EventType, TranscodingJobPayload, VideoTranscodedPayload,
    VideoTranscodingFailedPayload,
};
use job_queue_client::{redelivery_backoff, DeadLetterQueue, Delivery, JobQueue};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "transcoding-worker";

/// Counters shared with the health endpoint
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    current_video: Mutex<Option<String>>,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub current_video_id: Option<String>,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_processed: self.processed.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            current_video_id: self.current_video.lock().ok().and_then(|c| c.clone()),
        }
    }

    fn set_current(&self, video_id: Option<String>) {
        if let Ok(mut current) = self.current_video.lock() {
            *current = video_id;
        }
    }
}

/// Consumes `video-transcoding` jobs one at a time
pub struct TranscodingWorker {
    queue: Arc<dyn JobQueue>,
    processor: VideoProcessor,
    repository: Arc<dyn VideoRepository>,
    dead_letters: DeadLetterQueue,
    stats: Arc<WorkerStats>,
}

impl TranscodingWorker {
    /// Create a new transcoding worker
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processor: VideoProcessor,
        repository: Arc<dyn VideoRepository>,
    ) -> Self {
        Self {
            dead_letters: DeadLetterQueue::new(Arc::clone(&queue)).with_source(SERVICE_NAME),
            queue,
            processor,
            repository,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the job stream ends or `shutdown` flips to `true`
    ///
    /// Shutdown stops intake only; a job already taken runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(queue = self.queue.client_type(), "Subscribing to video-transcoding jobs");

        let mut deliveries = self.queue.deliveries(EventType::VideoTranscoding);

        info!("Waiting for transcoding jobs...");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, no longer taking jobs");
                break;
            }

            let next = tokio::select! {
                next = deliveries.next() => next,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping");
                        break;
                    }
                    continue;
                }
            };

            match next {
                Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                Some(Err(e)) => {
                    error!(error = %e, "Error receiving job from queue");
                    // Continue processing - don't crash on individual job errors
                }
                None => {
                    warn!("Job stream ended");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process one delivery and settle it with the queue
    pub async fn handle_delivery(&self, delivery: Delivery) {
        info!(
            event_id = %delivery.event.event_id,
            delivery_count = delivery.delivery_count,
            max_deliver = delivery.max_deliver,
            "Received transcoding job"
        );

        let job: TranscodingJobPayload = match delivery.event.payload_as() {
            Ok(job) => job,
            Err(e) => {
                // Redelivering a malformed payload cannot help
                error!(event_id = %delivery.event.event_id, error = %e, "Invalid job payload");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let reason = format!("invalid payload: {}", e);
                if let Err(e) = self.dead_letters.send_to_dlq(delivery, "unknown", &reason).await {
                    error!(error = %e, "Failed to dead-letter invalid job");
                }
                return;
            }
        };

        self.stats.set_current(Some(job.video_id.clone()));
        let outcome = self.processor.process(&job).await;
        self.stats.set_current(None);

        if outcome.success {
            self.stats.processed.fetch_add(1, Ordering::Relaxed);
            self.publish_transcoded(&job).await;
            if let Err(e) = delivery.ack().await {
                error!(video_id = job.video_id, error = %e, "Failed to ack job");
            }
            return;
        }

        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        let reason = outcome
            .error
            .unwrap_or_else(|| "unknown transcoding error".to_string());
        self.publish_failed(&job, &reason, delivery.delivery_count).await;

        if delivery.is_final_attempt() {
            if let Err(e) = self.dead_letters.send_to_dlq(delivery, &job.video_id, &reason).await {
                error!(video_id = job.video_id, error = %e, "Failed to dead-letter job");
            }
        } else {
            let delay = redelivery_backoff(delivery.delivery_count);
            info!(
                video_id = job.video_id,
                delivery_count = delivery.delivery_count,
                retry_in_secs = delay.as_secs(),
                "Requesting redelivery"
            );
            if let Err(e) = delivery.retry(delay).await {
                error!(video_id = job.video_id, error = %e, "Failed to request redelivery");
            }
        }
    }

    /// Publish `video.transcoded`; failures are logged only
    async fn publish_transcoded(&self, job: &TranscodingJobPayload) {
        let video = match self.repository.get(&job.video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => {
                warn!(video_id = job.video_id, "Transcoded video vanished before notification");
                return;
            }
            Err(e) => {
                warn!(video_id = job.video_id, error = %e, "Failed to load transcoded video");
                return;
            }
        };

        let Some(hls_manifest_path) = video.hls_manifest_path else {
            warn!(video_id = job.video_id, "Transcoded video has no manifest path");
            return;
        };

        let payload = VideoTranscodedPayload {
            video_id: video.id,
            trainer_id: video.trainer_id,
            hls_manifest_path,
            thumbnail_path: video.thumbnail_path,
            bundle_size: video.file_size,
            duration_sec: video.duration_sec,
        };
        self.publish(EventType::VideoTranscoded, payload).await;
    }

    async fn publish_failed(&self, job: &TranscodingJobPayload, error: &str, attempt: u32) {
        let payload = VideoTranscodingFailedPayload {
            video_id: job.video_id.clone(),
            trainer_id: job.trainer_id.clone(),
            error: error.to_string(),
            attempt,
            failed_at: chrono::Utc::now(),
        };
        self.publish(EventType::VideoTranscodingFailed, payload).await;
    }

    async fn publish<T: Serialize>(&self, event_type: EventType, payload: T) {
        let event = match Event::new(event_type, SERVICE_NAME, payload) {
            Ok(event) => event,
            Err(e) => {
                error!(event_type = event_type.as_str(), error = %e, "Failed to create event");
                return;
            }
        };

        if let Err(e) = self.queue.publish(&event).await {
            warn!(event_type = event_type.as_str(), error = %e, "Failed to publish event");
        }
    }
}
