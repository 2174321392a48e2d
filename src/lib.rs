//! IntentON node - hierarchical agent identity and access control
//!
//! Each node in a tree stands for a personalized agent. A node
//! authenticates against an enterprise identity provider, binds its
//! enterprise and source-platform identities, receives the default roles of
//! its domain, and may spawn children whose permissions are reduced from
//! its own.
//!
//! ## Components
//!
//! - **Identity**: agent ids and the per-node identity record
//! - **Auth**: role hierarchy, permission matrix, policy engine, audit log,
//!   provider adapters and the authentication state machine
//! - **Orchestrator**: the node tree (spawn, depth limit, lookup, delegation)
//! - **Logging**: per-tree lifecycle event sink

pub mod auth;
pub mod config;
pub mod identity;
pub mod logging;
pub mod orchestrator;
pub mod types;

pub use config::Args;
pub use identity::{AgentId, AgentIdentity, Domain};
pub use orchestrator::{Node, NodeSummary, NodeTree, TreeOptions};
pub use types::{NodeError, Recovery, Result};
