//! Core NATS implementation of the message bus client
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


use async_nats::connection::State;
use async_trait::async_trait;
use cinder_types::{Event, EventType};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info, warn};

use crate::error::{MessageBusError, Result};
use crate::traits::{subject_for, EventStream, MessageBusClient};

/// NATS message bus client
///
/// When a queue group is set, subscribers sharing it split deliveries so
/// each request is handled by one worker instance.
pub struct NatsClient {
    client: async_nats::Client,
    subject_prefix: String,
    queue_group: Option<String>,
}

impl NatsClient {
    /// Connect to a NATS server
    pub async fn new(
        url: &str,
        subject_prefix: impl Into<String>,
        queue_group: Option<String>,
    ) -> Result<Self> {
        info!(url = url, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| MessageBusError::Connection(e.to_string()))?;

        let subject_prefix = subject_prefix.into();
        info!(
            prefix = %subject_prefix,
            queue_group = ?queue_group,
            "NATS client initialized"
        );

        Ok(Self {
            client,
            subject_prefix,
            queue_group,
        })
    }

    fn subject(&self, event_type: EventType) -> String {
        subject_for(&self.subject_prefix, event_type)
    }
}

#[async_trait]
impl MessageBusClient for NatsClient {
    async fn publish(&self, event: &Event) -> Result<()> {
        let subject = self.subject(event.event_type);
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| MessageBusError::Publish(e.to_string()))?;

        info!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            subject = %subject,
            "Event published"
        );

        Ok(())
    }

    fn subscribe(&self, event_type: EventType) -> EventStream<'_> {
        let subject = self.subject(event_type);

        info!(
            subject = %subject,
            event_type = event_type.as_str(),
            "Subscribing to events"
        );

        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Event, MessageBusError>>(100);
        let client = self.client.clone();
        let queue_group = self.queue_group.clone();

        tokio::spawn(async move {
            let subscription = match queue_group {
                Some(group) => client.queue_subscribe(subject.clone(), group).await,
                None => client.subscribe(subject.clone()).await,
            };

            let mut subscriber = match subscription {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    error!(error = %e, subject = %subject, "Failed to create subscription");
                    let _ = tx.send(Err(MessageBusError::Subscribe(e.to_string()))).await;
                    return;
                }
            };

            info!(subject = %subject, "Subscription created, waiting for messages");

            while let Some(message) = subscriber.next().await {
                let item = serde_json::from_slice::<Event>(&message.payload).map_err(|e| {
                    warn!(error = %e, subject = %subject, "Failed to deserialize event");
                    MessageBusError::Serialization(e)
                });

                if tx.send(item).await.is_err() {
                    info!(subject = %subject, "Receiver dropped, stopping subscription");
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}
