//! Audit trail for permission checks.
//!
//! Every check made by an auditing policy engine is appended here before it
//! is evaluated; the outcome is filled in afterwards. The log is append-only
//! and owned by a single engine, so entries are in chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::auth::permissions::Role;
use crate::identity::AgentId;

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    /// When the check was requested
    pub timestamp: DateTime<Utc>,
    /// Identity the check was made for
    pub agent_id: AgentId,
    /// Action name as requested (may be unknown to the table)
    pub action: String,
    /// Resource the action targets
    pub resource: Option<String>,
    /// Free-form request context
    pub context: serde_json::Value,
    /// Roles held at the time of the check
    pub roles: BTreeSet<Role>,
    /// Result of the check, once evaluated
    pub granted: Option<bool>,
}

impl AuditEntry {
    pub fn new(
        agent_id: AgentId,
        action: impl Into<String>,
        resource: Option<&str>,
        context: Option<serde_json::Value>,
        roles: BTreeSet<Role>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            agent_id,
            action: action.into(),
            resource: resource.map(str::to_string),
            context: context.unwrap_or_else(|| serde_json::json!({})),
            roles,
            granted: None,
        }
    }
}

/// Append-only audit log owned by one policy engine.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its position.
    pub fn append(&mut self, entry: AuditEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Record the outcome of the check logged at `position`.
    pub fn record_outcome(&mut self, position: usize, granted: bool) {
        if let Some(entry) = self.entries.get_mut(position) {
            entry.granted = Some(granted);
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries with `start <= timestamp <= end`; a missing bound is open.
    pub fn between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect()
    }

    /// Entries for one action name.
    pub fn by_action(&self, action: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Get statistics.
    pub fn stats(&self) -> AuditStats {
        let granted = self
            .entries
            .iter()
            .filter(|e| e.granted == Some(true))
            .count();
        let denied = self
            .entries
            .iter()
            .filter(|e| e.granted == Some(false))
            .count();

        AuditStats {
            total_checks: self.entries.len(),
            granted,
            denied,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStats {
    /// Checks logged
    pub total_checks: usize,
    /// Checks that were granted
    pub granted: usize,
    /// Checks that were denied
    pub denied: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Domain;
    use chrono::Duration;

    fn entry(action: &str) -> AuditEntry {
        AuditEntry::new(
            AgentId::generate(&Domain::Enterprise),
            action,
            Some("tree"),
            None,
            BTreeSet::from([Role::Auditor]),
        )
    }

    #[test]
    fn test_append_and_outcome() {
        let mut log = AuditLog::new();
        let pos = log.append(entry("create"));
        assert!(log.entries()[pos].granted.is_none());
        assert_eq!(log.entries()[pos].context, serde_json::json!({}));

        log.record_outcome(pos, false);
        assert_eq!(log.entries()[pos].granted, Some(false));

        let stats = log.stats();
        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.granted, 0);
    }

    #[test]
    fn test_between_bounds_are_inclusive() {
        let mut log = AuditLog::new();
        let now = Utc::now();

        let mut early = entry("read");
        early.timestamp = now - Duration::minutes(10);
        let mut middle = entry("update");
        middle.timestamp = now;
        let mut late = entry("delete");
        late.timestamp = now + Duration::minutes(10);

        log.append(early);
        log.append(middle);
        log.append(late);

        let window = log.between(Some(now), Some(now));
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].action, "update");

        assert_eq!(log.between(Some(now), None).len(), 2);
        assert_eq!(log.between(None, Some(now)).len(), 2);
        assert_eq!(log.between(None, None).len(), 3);
    }

    #[test]
    fn test_by_action() {
        let mut log = AuditLog::new();
        log.append(entry("read"));
        log.append(entry("audit"));
        log.append(entry("read"));
        assert_eq!(log.by_action("read").len(), 2);
        assert!(log.by_action("override").is_empty());
    }
}
