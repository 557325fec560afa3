//! Traits for message bus operations

use async_trait::async_trait;
use cinder_types::{Event, EventType};
use futures::Stream;
use std::pin::Pin;

use crate::error::MessageBusError;

/// Stream of events delivered to a subscriber
pub type EventStream<'a> =
    Pin<Box<dyn Stream<Item = std::result::Result<Event, MessageBusError>> + Send + 'a>>;

/// Trait for message bus clients
#[async_trait]
pub trait MessageBusClient: Send + Sync {
    /// Publish an event to the message bus
    async fn publish(&self, event: &Event) -> Result<(), MessageBusError>;

    /// Subscribe to events of a specific type
    fn subscribe(&self, event_type: EventType) -> EventStream<'_>;

    /// Check if the client is connected
    async fn is_connected(&self) -> bool;

    /// Get the client type name
    fn client_type(&self) -> &str;
}

/// Subject an event type travels on, e.g. `cinder.transcode_requested`
pub fn subject_for(prefix: &str, event_type: EventType) -> String {
    format!("{}.{}", prefix, event_type.as_str().replace('.', "_"))
}
