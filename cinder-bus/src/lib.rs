//! Message Bus Client Library
//!
//! Publishes and consumes Cinder events over core NATS. An in-process
//! bus with the same interface backs tests and single-binary runs.

pub mod error;
pub mod memory;
pub mod nats;
pub mod traits;

pub use error::*;
pub use memory::*;
pub use nats::*;
pub use traits::*;
