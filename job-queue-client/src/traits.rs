//! Traits for job queue operations
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


use async_trait::async_trait;
use coursecast_types::{Event, EventType};
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{QueueError, Result};

/// Stream of job deliveries
pub type DeliveryStream<'a> = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send + 'a>>;

/// Trait for job queue clients
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish an event (a job or a notification) to the queue
    async fn publish(&self, event: &Event) -> Result<()>;

    /// Consume jobs of a specific type
    ///
    /// Every delivery must be settled with [`Delivery::ack`],
    /// [`Delivery::retry`] or [`Delivery::dead_letter`]; an unsettled
    /// delivery is redelivered once the queue's ack window lapses.
    fn deliveries(&self, job_type: EventType) -> DeliveryStream<'_>;

    /// Check if the client is connected
    async fn is_connected(&self) -> bool;

    /// Get the client type name
    fn client_type(&self) -> &str;
}

/// Backend-specific settlement of one delivery
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgement; the queue redelivers after `delay`
    async fn nak(&self, delay: Duration) -> Result<()>;

    /// Stop redelivering this message
    async fn term(&self) -> Result<()>;
}

/// One delivery of a job
pub struct Delivery {
    pub event: Event,
    /// 1-based count of deliveries of this job, including this one
    pub delivery_count: u32,
    /// Deliveries allowed before the job is dead-lettered
    pub max_deliver: u32,
    acknowledger: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        event: Event,
        delivery_count: u32,
        max_deliver: u32,
        acknowledger: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            event,
            delivery_count: delivery_count.max(1),
            max_deliver,
            acknowledger,
        }
    }

    /// No redelivery will follow a failure of this attempt
    pub fn is_final_attempt(&self) -> bool {
        self.max_deliver > 0 && self.delivery_count >= self.max_deliver
    }

    pub async fn ack(self) -> Result<()> {
        self.acknowledger.ack().await
    }

    /// Ask for redelivery after `delay`
    pub async fn retry(self, delay: Duration) -> Result<()> {
        if self.is_final_attempt() {
            return Err(QueueError::Acknowledge(format!(
                "delivery {} of {} cannot be retried",
                self.delivery_count, self.max_deliver
            )));
        }
        self.acknowledger.nak(delay).await
    }

    pub async fn dead_letter(self) -> Result<()> {
        self.acknowledger.term().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("event_id", &self.event.event_id)
            .field("event_type", &self.event.event_type)
            .field("delivery_count", &self.delivery_count)
            .field("max_deliver", &self.max_deliver)
            .finish()
    }
}

/// Redelivery delay for a failed attempt: 30s doubling per attempt, capped at 15 minutes
pub fn redelivery_backoff(delivery_count: u32) -> Duration {
    let exponent = delivery_count.saturating_sub(1).min(5);
    let secs = 30u64 * (1u64 << exponent);
    Duration::from_secs(secs.min(900))
}
