//! Event type definitions for the message bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schemas::*;
use crate::error::{CinderError, Result};

/// Event type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "transcode.requested")]
    TranscodeRequested,
    #[serde(rename = "transcode.completed")]
    TranscodeCompleted,
}

impl EventType {
    /// Dotted name used on the wire and to derive bus subjects
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TranscodeRequested => "transcode.requested",
            EventType::TranscodeCompleted => "transcode.completed",
        }
    }
}

/// Base event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type identifier
    pub event_type: EventType,

    /// Unique event identifier
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Source service that published the event
    pub source: String,

    /// Event payload (type depends on event_type)
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self> {
        let payload_value = serde_json::to_value(payload)?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: payload_value,
        })
    }

    /// Deserialize the payload into a specific type
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| CinderError::InvalidPayload(e.to_string()))
    }

    /// Validate the event structure
    pub fn validate(&self) -> Result<()> {
        match self.event_type {
            EventType::TranscodeRequested => {
                let payload: TranscodeRequestedPayload = self.payload_as()?;
                payload.validate()?;
            }
            EventType::TranscodeCompleted => {
                let _: TranscodeCompletedPayload = self.payload_as()?;
            }
        }
        Ok(())
    }
}
