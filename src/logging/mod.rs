//! Logging infrastructure
//!
//! Provides the per-tree lifecycle event sink. Process-level logging goes
//! through `tracing`; the subscriber is installed by the binary.

pub mod events;

pub use events::{EventLogger, EventType, NodeEvent};
