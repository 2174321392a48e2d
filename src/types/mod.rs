//! Shared types

pub mod error;

pub use error::{NodeError, Recovery, Result};
