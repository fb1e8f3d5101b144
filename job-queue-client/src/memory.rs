//! In-memory job queue for tests and local development
//!
//! Mirrors the delivery contract of the JetStream queue: delivery counts,
//! delayed redelivery on nak, and no further delivery after ack or term.
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
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::traits::{Acknowledger, Delivery, DeliveryStream, JobQueue};

/// A queued delivery; carries its own requeue handle so the channel stays
/// open exactly as long as some delivery can still be redelivered
struct Pending {
    event: Event,
    delivery_count: u32,
    requeue: mpsc::UnboundedSender<Pending>,
}

#[derive(Default)]
struct Ledger {
    published: Vec<Event>,
    acked: Vec<Uuid>,
    retried: Vec<(Uuid, u32)>,
    dead_lettered: Vec<Uuid>,
}

/// In-memory queue with a single consumer for the job type
pub struct InMemoryJobQueue {
    job_type: EventType,
    max_deliver: u32,
    sender: Mutex<Option<mpsc::UnboundedSender<Pending>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Pending>>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryJobQueue {
    pub fn new(max_deliver: u32) -> Self {
        Self::for_job_type(EventType::VideoTranscoding, max_deliver)
    }

    pub fn for_job_type(job_type: EventType, max_deliver: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            job_type,
            max_deliver,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Stop accepting new jobs; the delivery stream ends once every
    /// outstanding delivery has been acked or dead-lettered
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// Every event published so far, in order
    pub fn published(&self) -> Vec<Event> {
        self.ledger
            .lock()
            .map(|l| l.published.clone())
            .unwrap_or_default()
    }

    pub fn published_of(&self, event_type: EventType) -> Vec<Event> {
        self.published()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn acked(&self) -> Vec<Uuid> {
        self.ledger.lock().map(|l| l.acked.clone()).unwrap_or_default()
    }

    /// `(event id, delivery count)` of every nak
    pub fn retried(&self) -> Vec<(Uuid, u32)> {
        self.ledger.lock().map(|l| l.retried.clone()).unwrap_or_default()
    }

    pub fn dead_lettered(&self) -> Vec<Uuid> {
        self.ledger
            .lock()
            .map(|l| l.dead_lettered.clone())
            .unwrap_or_default()
    }
}

struct MemoryAcknowledger {
    event: Event,
    delivery_count: u32,
    sender: mpsc::UnboundedSender<Pending>,
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryAcknowledger {
    fn record(&self, f: impl FnOnce(&mut Ledger)) -> Result<()> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| QueueError::Acknowledge("ledger poisoned".to_string()))?;
        f(&mut ledger);
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcknowledger {
    async fn ack(&self) -> Result<()> {
        let id = self.event.event_id;
        self.record(|l| l.acked.push(id))
    }

    async fn nak(&self, delay: Duration) -> Result<()> {
        let id = self.event.event_id;
        let count = self.delivery_count;
        self.record(|l| l.retried.push((id, count)))?;

        let sender = self.sender.clone();
        let next = Pending {
            event: self.event.clone(),
            delivery_count: count + 1,
            requeue: self.sender.clone(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(next).is_err() {
                warn!("Queue dropped before redelivery");
            }
        });
        Ok(())
    }

    async fn term(&self) -> Result<()> {
        let id = self.event.event_id;
        self.record(|l| l.dead_lettered.push(id))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn publish(&self, event: &Event) -> Result<()> {
        {
            let mut ledger = self
                .ledger
                .lock()
                .map_err(|_| QueueError::Publish("ledger poisoned".to_string()))?;
            ledger.published.push(event.clone());
        }

        if event.event_type == self.job_type {
            let sender = self
                .sender
                .lock()
                .map_err(|_| QueueError::Publish("sender poisoned".to_string()))?;
            let sender = sender.as_ref().ok_or(QueueError::Closed)?;
            sender
                .send(Pending {
                    event: event.clone(),
                    delivery_count: 1,
                    requeue: sender.clone(),
                })
                .map_err(|_| QueueError::Closed)?;
            debug!(event_id = %event.event_id, "Job enqueued");
        }

        Ok(())
    }

    fn deliveries(&self, job_type: EventType) -> DeliveryStream<'_> {
        let receiver = if job_type == self.job_type {
            self.receiver.lock().ok().and_then(|mut r| r.take())
        } else {
            None
        };

        let receiver = match receiver {
            Some(receiver) => receiver,
            None => {
                return Box::pin(tokio_stream::once(Err(QueueError::Subscribe(format!(
                    "no consumable queue for {}",
                    job_type.as_str()
                )))));
            }
        };

        let max_deliver = self.max_deliver;
        let ledger = Arc::clone(&self.ledger);
        Box::pin(UnboundedReceiverStream::new(receiver).map(move |pending| {
            Ok(Delivery::new(
                pending.event.clone(),
                pending.delivery_count,
                max_deliver,
                Box::new(MemoryAcknowledger {
                    event: pending.event,
                    delivery_count: pending.delivery_count,
                    sender: pending.requeue,
                    ledger: Arc::clone(&ledger),
                }),
            ))
        }))
    }

    async fn is_connected(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn client_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_types::TranscodingJobPayload;

    fn job_event() -> Event {
        Event::transcoding_job(
            "test",
            &TranscodingJobPayload {
                video_id: "v1".to_string(),
                trainer_id: "t1".to_string(),
                original_path: "uploads/v1/raw.mp4".to_string(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ack_completes_job() {
        let queue = InMemoryJobQueue::new(3);
        let event = job_event();
        queue.publish(&event).await.unwrap();
        queue.close();

        let mut stream = queue.deliveries(EventType::VideoTranscoding);
        let delivery = tokio_test::assert_ok!(stream.next().await.unwrap());
        assert_eq!(delivery.delivery_count, 1);
        tokio_test::assert_ok!(delivery.ack().await);
        drop(stream);

        assert_eq!(queue.acked(), vec![event.event_id]);
    }

    #[tokio::test]
    async fn test_nak_redelivers_with_incremented_count() {
        let queue = InMemoryJobQueue::new(2);
        queue.publish(&job_event()).await.unwrap();
        queue.close();

        let mut stream = queue.deliveries(EventType::VideoTranscoding);
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_final_attempt());
        first.retry(Duration::from_millis(1)).await.unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        assert!(second.is_final_attempt());
        assert!(second.retry(Duration::from_millis(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_after_close_and_settlement() {
        let queue = InMemoryJobQueue::new(3);
        queue.publish(&job_event()).await.unwrap();
        queue.close();

        let mut stream = queue.deliveries(EventType::VideoTranscoding);
        let delivery = stream.next().await.unwrap().unwrap();
        delivery.dead_letter().await.unwrap();

        assert!(stream.next().await.is_none());
        assert_eq!(queue.dead_lettered().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails_for_jobs() {
        let queue = InMemoryJobQueue::new(3);
        queue.close();
        assert!(matches!(queue.publish(&job_event()).await, Err(QueueError::Closed)));
        assert!(!queue.is_connected().await);
    }
}
