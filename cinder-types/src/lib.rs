//! Cinder Types
//!
//! Shared type definitions for status codes, persisted entities, bus events
//! and payload schemas used across the Cinder services.

pub mod events;
pub mod models;
pub mod schemas;
pub mod status;
pub mod error;

pub use events::*;
pub use models::*;
pub use schemas::*;
pub use status::*;
pub use error::*;
