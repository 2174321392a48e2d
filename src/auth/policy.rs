//! Policy engine: authorization, delegation eligibility and scope-reduced
//! inheritance for one agent identity.
//!
//! The engine owns its node's [`AgentIdentity`]. Checks never fail: a role
//! missing from the table or an unknown action name is simply denied.
//! When the table's variant audits, every check is appended to the audit
//! log before it is evaluated.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::audit::{AuditEntry, AuditLog};
use crate::auth::permissions::{Action, PolicyTable, Role};
use crate::identity::{AgentIdentity, PermissionEffect};
use crate::logging::{EventLogger, NodeEvent};

pub struct PolicyEngine {
    identity: AgentIdentity,
    table: Arc<PolicyTable>,
    audit_log: Option<AuditLog>,
    events: EventLogger,
}

impl PolicyEngine {
    pub fn new(identity: AgentIdentity, table: Arc<PolicyTable>, events: EventLogger) -> Self {
        let audit_log = table.variant().audits().then(AuditLog::new);
        Self {
            identity,
            table,
            audit_log,
            events,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut AgentIdentity {
        &mut self.identity
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Audit log, when the variant keeps one
    pub fn audit_log(&self) -> Option<&AuditLog> {
        self.audit_log.as_ref()
    }

    /// Replace the identity's role set
    pub fn assign_roles(&mut self, roles: BTreeSet<Role>) {
        self.identity.roles = roles;
    }

    /// Whether any held role maps `action` to true
    pub fn validate_permission(
        &mut self,
        action: Action,
        resource: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> bool {
        self.evaluate(action.as_str(), Some(action), resource, context)
    }

    /// Shorthand for a check without resource or context
    pub fn check(&mut self, action: Action) -> bool {
        self.validate_permission(action, None, None)
    }

    /// Check an action given by name. Names outside [`Action`] are audited
    /// as requested and denied.
    pub fn validate_named(
        &mut self,
        action: &str,
        resource: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> bool {
        let parsed = action.parse::<Action>().ok();
        self.evaluate(action, parsed, resource, context)
    }

    fn evaluate(
        &mut self,
        name: &str,
        action: Option<Action>,
        resource: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> bool {
        let position = self.audit_log.as_mut().map(|log| {
            log.append(AuditEntry::new(
                self.identity.agent_id.clone(),
                name,
                resource,
                context,
                self.identity.roles.clone(),
            ))
        });

        let granted_by = action.and_then(|action| {
            self.identity
                .roles
                .iter()
                .copied()
                .find(|role| self.table.allows(*role, action))
        });

        if let (Some(log), Some(pos)) = (self.audit_log.as_mut(), position) {
            log.record_outcome(pos, granted_by.is_some());
        }

        match granted_by {
            Some(role) => {
                debug!("Permission granted: {} for {}", name, role);
                true
            }
            None => {
                warn!(
                    "Permission denied: {} for identity {}",
                    name, self.identity.agent_id
                );
                self.events.log(
                    NodeEvent::permission_denied(&self.identity.agent_id)
                        .with_detail(name.to_string()),
                );
                false
            }
        }
    }

    /// Whether this identity may delegate to `target`: it needs the
    /// `delegate` action and some held role must list `target` directly in
    /// its subsumption set.
    pub fn can_delegate_to(&mut self, target: Role) -> bool {
        if !self.check(Action::Delegate) {
            return false;
        }

        self.identity.roles.iter().any(|role| {
            self.table
                .subsumes(*role)
                .map(|set| set.contains(&target))
                .unwrap_or(false)
        })
    }

    /// Matrix rows this identity may take over from `parent`.
    ///
    /// For each parent role, every role of this identity that the parent
    /// role subsumes contributes its own matrix row, keyed by role name.
    /// The result never contains a role this identity does not hold.
    pub fn inherit_permissions(
        &mut self,
        parent: &AgentIdentity,
    ) -> BTreeMap<String, PermissionEffect> {
        let mut inherited = BTreeMap::new();

        if !self.check(Action::Inherit) {
            return inherited;
        }

        for parent_role in &parent.roles {
            let Some(reachable) = self.table.subsumes(*parent_role) else {
                continue;
            };
            for child_role in &self.identity.roles {
                if !reachable.contains(child_role) {
                    continue;
                }
                if let Some(row) = self.table.row(*child_role) {
                    inherited.insert(
                        child_role.as_str().to_string(),
                        PermissionEffect::Row(row.clone()),
                    );
                }
            }
        }

        debug!(
            "Inherited {} permission row(s) from {} into {}",
            inherited.len(),
            parent.agent_id,
            self.identity.agent_id
        );
        inherited
    }

    /// Audit entries within `[start, end]`, or the whole log without
    /// bounds. Requires the `audit` action; the check itself is logged
    /// first and is part of the returned entries.
    pub fn get_audit_logs(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        if !self.check(Action::Audit) {
            warn!("Permission denied: cannot access audit logs");
            return Vec::new();
        }

        match &self.audit_log {
            Some(log) => log.between(start, end),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::PolicyVariant;
    use crate::identity::{AgentId, Domain};

    fn engine(variant: PolicyVariant, roles: &[Role]) -> PolicyEngine {
        let domain = Domain::Enterprise;
        let mut identity = AgentIdentity::new(AgentId::generate(&domain), variant);
        identity.roles = roles.iter().copied().collect();
        PolicyEngine::new(
            identity,
            Arc::new(PolicyTable::for_variant(variant)),
            EventLogger::new(),
        )
    }

    #[test]
    fn test_validate_matches_matrix_for_every_role_set() {
        for variant in [PolicyVariant::Baseline, PolicyVariant::Extended] {
            let table = PolicyTable::for_variant(variant);
            // every subset of the five roles
            for mask in 0u32..(1 << Role::ALL.len()) {
                let roles: Vec<Role> = Role::ALL
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, r)| *r)
                    .collect();
                let mut policy = engine(variant, &roles);
                for action in Action::ALL {
                    let expected = roles.iter().any(|r| table.allows(*r, action));
                    assert_eq!(policy.check(action), expected, "{:?} {:?}", roles, action);
                }
            }
        }
    }

    #[test]
    fn test_unknown_action_never_granted() {
        for role in Role::ALL {
            let mut policy = engine(PolicyVariant::Extended, &[role]);
            assert!(!policy.validate_named("hack_the_planet", None, None));
            assert!(!policy.validate_named("", Some("root"), None));
        }
    }

    #[test]
    fn test_audit_appended_before_and_regardless_of_outcome() {
        let mut policy = engine(PolicyVariant::Extended, &[Role::Reader]);
        assert!(policy.check(Action::Read));
        assert!(!policy.validate_named(
            "launch",
            Some("silo"),
            Some(serde_json::json!({"why": "test"}))
        ));

        let log = policy.audit_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].action, "read");
        assert_eq!(log.entries()[0].granted, Some(true));
        assert_eq!(log.entries()[1].action, "launch");
        assert_eq!(log.entries()[1].resource.as_deref(), Some("silo"));
        assert_eq!(log.entries()[1].granted, Some(false));
    }

    #[test]
    fn test_baseline_keeps_no_audit_log() {
        let mut policy = engine(PolicyVariant::Baseline, &[Role::Owner]);
        assert!(policy.check(Action::Create));
        assert!(policy.audit_log().is_none());
        assert!(policy.get_audit_logs(None, None).is_empty());
    }

    #[test]
    fn test_can_delegate_to_is_one_hop() {
        let mut admin = engine(PolicyVariant::Extended, &[Role::Admin]);
        assert!(admin.can_delegate_to(Role::Contributor));
        assert!(admin.can_delegate_to(Role::Auditor));
        assert!(!admin.can_delegate_to(Role::Owner));
        assert!(!admin.can_delegate_to(Role::Admin));

        // contributor subsumes reader but lacks the delegate action
        let mut contributor = engine(PolicyVariant::Extended, &[Role::Contributor]);
        assert!(!contributor.can_delegate_to(Role::Reader));
    }

    #[test]
    fn test_inheritance_is_scope_reduced() {
        let parent = engine(PolicyVariant::Extended, &[Role::Admin]);
        let mut child = engine(PolicyVariant::Extended, &[Role::Contributor, Role::Owner]);

        let inherited = child.inherit_permissions(parent.identity());
        // admin subsumes contributor but not owner
        assert_eq!(inherited.len(), 1);
        assert!(inherited.contains_key("contributor"));
        assert!(!inherited.contains_key("owner"));
    }

    #[test]
    fn test_inheritance_keys_subset_of_child_roles() {
        let table = PolicyTable::extended();
        for parent_mask in 0u32..(1 << Role::ALL.len()) {
            for child_mask in 0u32..(1 << Role::ALL.len()) {
                let pick = |mask: u32| -> Vec<Role> {
                    Role::ALL
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << i) != 0)
                        .map(|(_, r)| *r)
                        .collect()
                };
                let parent = engine(PolicyVariant::Extended, &pick(parent_mask));
                let mut child = engine(PolicyVariant::Extended, &pick(child_mask));
                let inherited = child.inherit_permissions(parent.identity());

                for key in inherited.keys() {
                    let role: Role = key.parse().unwrap();
                    assert!(child.identity().has_role(role));
                    assert!(parent
                        .identity()
                        .roles
                        .iter()
                        .any(|p| table.subsumes(*p).unwrap().contains(&role)));
                }
            }
        }
    }

    #[test]
    fn test_inheritance_requires_inherit_action() {
        let parent = engine(PolicyVariant::Extended, &[Role::Owner]);
        let mut reader = engine(PolicyVariant::Extended, &[Role::Reader]);
        assert!(reader.inherit_permissions(parent.identity()).is_empty());
    }

    #[test]
    fn test_get_audit_logs_requires_audit() {
        let mut auditor = engine(PolicyVariant::Extended, &[Role::Auditor]);
        auditor.check(Action::Read);
        let logs = auditor.get_audit_logs(None, None);
        // the read check plus the audit check itself
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].action, "audit");

        let mut contributor = engine(PolicyVariant::Extended, &[Role::Contributor]);
        contributor.check(Action::Read);
        assert!(contributor.get_audit_logs(None, None).is_empty());
    }

    #[test]
    fn test_denial_reaches_event_sink() {
        let events = EventLogger::new();
        let mut identity =
            AgentIdentity::new(AgentId::generate(&Domain::Personal), PolicyVariant::Baseline);
        identity.roles = BTreeSet::from([Role::Reader]);
        let mut policy = PolicyEngine::new(
            identity,
            Arc::new(PolicyTable::baseline()),
            events.clone(),
        );

        assert!(!policy.check(Action::Delete));
        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].detail.as_deref(), Some("delete"));
    }
}
