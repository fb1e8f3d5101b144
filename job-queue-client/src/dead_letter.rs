//! Dead letter handling for jobs that exhausted their deliveries
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


use coursecast_types::{DeadLetterPayload, Event, EventType};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::Result;
use crate::traits::{Delivery, JobQueue};

/// Dead letter queue handler
pub struct DeadLetterQueue {
    queue: Arc<dyn JobQueue>,
    source: String,
}

impl DeadLetterQueue {
    /// Create a new dead letter queue
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            source: "transcoding-worker".to_string(),
        }
    }

    /// Create with custom source service name
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Terminate the delivery and publish a dead-letter record for it
    pub async fn send_to_dlq(
        &self,
        delivery: Delivery,
        video_id: &str,
        failure_reason: &str,
    ) -> Result<()> {
        let payload = DeadLetterPayload {
            original_event_id: delivery.event.event_id,
            video_id: video_id.to_string(),
            failure_reason: failure_reason.to_string(),
            delivery_count: delivery.delivery_count,
            failed_at: chrono::Utc::now(),
            original_payload: delivery.event.payload.clone(),
        };
        let delivery_count = delivery.delivery_count;

        delivery.dead_letter().await?;

        let event = Event::new(
            EventType::VideoTranscodingDeadLettered,
            self.source.clone(),
            payload,
        )?;

        self.queue.publish(&event).await?;

        error!(
            video_id = video_id,
            delivery_count = delivery_count,
            reason = failure_reason,
            "Job sent to dead letter queue"
        );

        info!(
            video_id = video_id,
            event_id = %event.event_id,
            "Dead letter event published"
        );

        Ok(())
    }
}
