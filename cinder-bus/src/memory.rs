//! In-process message bus
//!
//! Delivers every published event to every live subscriber of its type.
//! Nothing leaves the process, so it suits tests and local runs.

use async_trait::async_trait;
use cinder_types::{Event, EventType};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, warn};

use crate::error::{MessageBusError, Result};
use crate::traits::{EventStream, MessageBusClient};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast-backed bus living inside one process
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<Event>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBusClient for MemoryBus {
    async fn publish(&self, event: &Event) -> Result<()> {
        // No subscriber is not an error, the event is simply dropped
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            receivers,
            "Event published in-process"
        );
        Ok(())
    }

    fn subscribe(&self, event_type: EventType) -> EventStream<'_> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| match item {
            Ok(event) if event.event_type == event_type => Some(Ok(event)),
            Ok(_) => None,
            Err(lagged) => {
                warn!(error = %lagged, "In-process subscriber lagged");
                Some(Err(MessageBusError::Subscribe(lagged.to_string())))
            }
        });

        Box::pin(stream)
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn client_type(&self) -> &str {
        "memory"
    }
}
