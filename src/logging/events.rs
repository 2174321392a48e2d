//! Lifecycle event sink for one node tree
//!
//! Events are kept in memory and, when a path is configured, appended to a
//! JSONL file. A logger is created with the root node and cloned into every
//! node and authenticator of that tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

use crate::identity::AgentId;

/// Maximum events kept in memory before the oldest are dropped.
const MAX_EVENTS: usize = 10_000;

/// Event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Node added to the tree
    NodeCreated,
    /// Node finished initialization
    NodeInitialized,
    /// Node initialization returned failure
    NodeInitFailed,
    /// Authentication fell back to the simulated result
    AuthFallback,
    /// An external identity was bound
    IdentityBound,
    /// Binding an external identity failed
    BindingFailed,
    /// A child node was spawned
    ChildSpawned,
    /// Spawning a child failed or was refused
    SpawnFailed,
    /// A permission check was denied
    PermissionDenied,
    /// A permission was delegated to another node
    PermissionDelegated,
}

/// One lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event type
    pub event_type: EventType,
    /// Node the event concerns
    pub agent_id: AgentId,
    /// Other node involved (child, delegation target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AgentId>,
    /// Free-form detail (action name, error message, identity)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NodeEvent {
    /// Create a new event
    pub fn new(event_type: EventType, agent_id: &AgentId) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            agent_id: agent_id.clone(),
            target: None,
            detail: None,
        }
    }

    pub fn permission_denied(agent_id: &AgentId) -> Self {
        Self::new(EventType::PermissionDenied, agent_id)
    }

    /// Set the other node involved
    pub fn with_target(mut self, target: &AgentId) -> Self {
        self.target = Some(target.clone());
        self
    }

    /// Set the detail text
    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Event sink shared by the nodes of one tree
#[derive(Clone, Default)]
pub struct EventLogger {
    inner: Arc<Mutex<EventLoggerInner>>,
}

#[derive(Default)]
struct EventLoggerInner {
    events: VecDeque<NodeEvent>,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl EventLogger {
    /// Create an in-memory logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger that also appends to the JSONL file at `path`
    pub fn with_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let logger = Self::new();
        logger.init_file(path.as_ref().to_path_buf())?;
        Ok(logger)
    }

    /// Start appending to a JSONL file
    pub fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.lock();
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Event logging initialized to {}", path.display());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, EventLoggerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event
    pub fn log(&self, event: NodeEvent) {
        let mut inner = self.lock();

        if let Some(ref mut writer) = inner.writer {
            match event.to_jsonl() {
                Ok(line) => {
                    if let Err(e) = writeln!(writer, "{}", line) {
                        error!("Failed to write node event: {}", e);
                    }
                    if let Err(e) = writer.flush() {
                        error!("Failed to flush event log: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize node event: {}", e),
            }
        }

        inner.events.push_back(event);
        while inner.events.len() > MAX_EVENTS {
            inner.events.pop_front();
        }
    }

    /// Events recorded so far, oldest first
    pub fn events(&self) -> Vec<NodeEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Events of one type, oldest first
    pub fn events_of(&self, event_type: EventType) -> Vec<NodeEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// File the logger appends to, if any
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Domain;

    #[test]
    fn test_in_memory_events() {
        let logger = EventLogger::new();
        let id = AgentId::generate(&Domain::Family);
        let child = AgentId::generate(&Domain::Business);

        logger.log(NodeEvent::new(EventType::NodeCreated, &id));
        logger.log(NodeEvent::new(EventType::ChildSpawned, &id).with_target(&child));

        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].target.as_ref(), Some(&child));
        assert_eq!(logger.events_of(EventType::ChildSpawned).len(), 1);
        assert!(logger.path().is_none());
    }

    #[test]
    fn test_clones_share_events() {
        let logger = EventLogger::new();
        let clone = logger.clone();
        clone.log(NodeEvent::new(
            EventType::AuthFallback,
            &AgentId::generate(&Domain::Personal),
        ));
        assert_eq!(logger.events().len(), 1);
    }

    #[test]
    fn test_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = EventLogger::with_file(&path).unwrap();

        let id = AgentId::generate(&Domain::Enterprise);
        logger.log(NodeEvent::new(EventType::NodeInitialized, &id));
        logger.log(
            NodeEvent::permission_denied(&id).with_detail("override".to_string()),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: NodeEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.event_type, EventType::PermissionDenied);
        assert_eq!(parsed.detail.as_deref(), Some("override"));
        assert!(!lines[0].contains("\"target\""));
    }
}
