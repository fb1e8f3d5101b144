//! NATS JetStream implementation of the job queue client
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


use async_nats::jetstream::{self, consumer::pull, AckKind, Context};
use async_trait::async_trait;
use coursecast_types::{Event, EventType};
use std::time::Duration;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info, warn};

use crate::error::{QueueError, Result};
use crate::traits::{Acknowledger, Delivery, DeliveryStream, JobQueue};

/// NATS JetStream job queue
pub struct NatsJobQueue {
    client: async_nats::Client,
    jetstream: Context,
    stream_name: String,
    subject_prefix: String,
    max_deliver: u32,
    ack_wait: Duration,
}

impl NatsJobQueue {
    /// Connect and make sure the backing stream exists
    pub async fn new(
        url: &str,
        stream_name: impl Into<String>,
        max_deliver: u32,
        ack_wait: Duration,
    ) -> Result<Self> {
        info!(url = url, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());
        let stream_name = stream_name.into();
        let subject_prefix = "coursecast".to_string();

        Self::ensure_stream(&jetstream, &stream_name, &subject_prefix).await?;

        info!(
            stream = stream_name,
            max_deliver = max_deliver,
            ack_wait_secs = ack_wait.as_secs(),
            "NATS job queue initialized"
        );

        Ok(Self {
            client,
            jetstream,
            stream_name,
            subject_prefix,
            max_deliver,
            ack_wait,
        })
    }

    /// Ensure the JetStream stream exists
    async fn ensure_stream(
        jetstream: &Context,
        stream_name: &str,
        subject_prefix: &str,
    ) -> Result<()> {
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name.to_string(),
                subjects: vec![format!("{}.>", subject_prefix)],
                max_age: Duration::from_secs(86400 * 7), // 7 days retention
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to create stream: {}", e)))?;

        info!(stream = stream_name, "Stream ensured");

        Ok(())
    }

    /// Get the subject for an event type
    pub fn subject_for_event_type(&self, event_type: EventType) -> String {
        subject_for(&self.subject_prefix, event_type)
    }
}

/// `{prefix}.{event type}` with dots folded to underscores
pub fn subject_for(subject_prefix: &str, event_type: EventType) -> String {
    format!("{}.{}", subject_prefix, event_type.as_str().replace('.', "_"))
}

/// Durable consumer name for a job type
fn consumer_name(event_type: EventType) -> String {
    format!("{}-worker", event_type.as_str().replace('.', "-"))
}

struct NatsAcknowledger {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for NatsAcknowledger {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }

    async fn nak(&self, delay: Duration) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }

    async fn term(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn publish(&self, event: &Event) -> Result<()> {
        let subject = self.subject_for_event_type(event.event_type);

        let payload = serde_json::to_vec(event).map_err(QueueError::Serialization)?;

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        info!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            subject = subject,
            "Event published"
        );

        Ok(())
    }

    fn deliveries(&self, job_type: EventType) -> DeliveryStream<'_> {
        let subject = self.subject_for_event_type(job_type);
        let durable = consumer_name(job_type);

        info!(
            subject = subject,
            consumer = durable,
            "Subscribing to jobs"
        );

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Delivery>>(1);
        let jetstream = self.jetstream.clone();
        let stream_name = self.stream_name.clone();
        let max_deliver = self.max_deliver;
        let ack_wait = self.ack_wait;

        tokio::spawn(async move {
            let consumer = async {
                let stream = jetstream
                    .get_stream(&stream_name)
                    .await
                    .map_err(|e| QueueError::Subscribe(e.to_string()))?;
                stream
                    .get_or_create_consumer(
                        &durable,
                        pull::Config {
                            durable_name: Some(durable.clone()),
                            filter_subject: subject.clone(),
                            ack_policy: jetstream::consumer::AckPolicy::Explicit,
                            ack_wait,
                            max_deliver: max_deliver as i64,
                            // One job in flight per consumer
                            max_ack_pending: 1,
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| QueueError::Subscribe(e.to_string()))
            }
            .await;

            let consumer = match consumer {
                Ok(consumer) => consumer,
                Err(e) => {
                    error!(error = %e, "Failed to create consumer");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "Failed to open message stream");
                    let _ = tx.send(Err(QueueError::Subscribe(e.to_string()))).await;
                    return;
                }
            };

            info!(subject = subject, "Consumer ready, waiting for jobs");

            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        error!(error = %e, "Error pulling job");
                        if tx.send(Err(QueueError::Subscribe(e.to_string()))).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let delivery_count = message
                    .info()
                    .map(|info| info.delivered.max(1) as u32)
                    .unwrap_or(1);

                match serde_json::from_slice::<Event>(&message.payload) {
                    Ok(event) => {
                        let delivery = Delivery::new(
                            event,
                            delivery_count,
                            max_deliver,
                            Box::new(NatsAcknowledger { message }),
                        );
                        if tx.send(Ok(delivery)).await.is_err() {
                            warn!("Receiver dropped, stopping consumer");
                            break;
                        }
                    }
                    Err(e) => {
                        // Poison message: redelivering it cannot help
                        error!(error = %e, "Failed to deserialize job, terminating it");
                        if let Err(term_err) = message.ack_with(AckKind::Term).await {
                            warn!(error = %term_err, "Failed to terminate poison message");
                        }
                        if tx.send(Err(QueueError::Serialization(e))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn is_connected(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}
