//! Agent identity record
//!
//! One [`AgentIdentity`] exists per node. It is created with the node,
//! written by the authenticator (bound identities) and by the policy layer
//! (roles, permissions), and dropped with the node.
//!
//! The permission map only grows: inheritance and delegation add or
//! overwrite entries, nothing in this crate removes them.

pub mod agent_id;

pub use agent_id::{AgentId, AGENT_ID_PREFIX};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::auth::permissions::{PermissionRow, PolicyVariant, Role};

/// Coarse domain tag selecting a node's default roles
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Personal,
    Family,
    Business,
    Enterprise,
    /// Any other tag; gets minimal privilege
    Other(String),
}

impl Domain {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "Personal" => Domain::Personal,
            "Family" => Domain::Family,
            "Business" => Domain::Business,
            "Enterprise" => Domain::Enterprise,
            other => Domain::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Domain::Personal => "Personal",
            Domain::Family => "Family",
            Domain::Business => "Business",
            Domain::Enterprise => "Enterprise",
            Domain::Other(tag) => tag,
        }
    }

    /// Default role set for this domain under a policy variant
    pub fn default_roles(&self, variant: PolicyVariant) -> BTreeSet<Role> {
        match (self, variant) {
            (Domain::Personal, _) => BTreeSet::from([Role::Owner]),
            (Domain::Family, _) => BTreeSet::from([Role::Admin]),
            (Domain::Business, _) => BTreeSet::from([Role::Contributor]),
            (Domain::Enterprise, PolicyVariant::Extended) => {
                BTreeSet::from([Role::Admin, Role::Auditor])
            }
            (Domain::Enterprise, PolicyVariant::Baseline) => BTreeSet::from([Role::Admin]),
            (Domain::Other(_), _) => BTreeSet::from([Role::Reader]),
        }
    }
}

impl From<String> for Domain {
    fn from(tag: String) -> Self {
        Domain::parse(&tag)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.as_str().to_string()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value stored under a permission name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionEffect {
    /// Plain grant, as written by delegation
    Flag(bool),
    /// A full matrix row, as copied by inheritance
    Row(PermissionRow),
}

impl PermissionEffect {
    pub fn is_granted(&self) -> bool {
        match self {
            PermissionEffect::Flag(granted) => *granted,
            PermissionEffect::Row(row) => row.values().any(|v| *v),
        }
    }
}

/// Strength of the last enterprise authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    #[default]
    Standard,
    Enterprise,
}

/// Session details tracked by the extended variant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    pub mfa_verified: bool,
    pub last_auth_time: Option<DateTime<Utc>>,
    pub session_expiry: Option<DateTime<Utc>>,
    pub security_level: SecurityLevel,
    /// Always false today: enterprise claims are read without checking the
    /// token signature.
    pub signature_verified: bool,
}

/// Bound identities, roles and permissions of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: AgentId,
    /// Source-hosting platform login
    pub source_platform_identity: Option<String>,
    /// Enterprise principal name or email
    pub enterprise_identity: Option<String>,
    /// Enterprise directory object id
    pub enterprise_object_id: Option<String>,
    pub roles: BTreeSet<Role>,
    pub permissions: BTreeMap<String, PermissionEffect>,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

impl AgentIdentity {
    /// Fresh record with no roles, permissions or bound identities
    pub fn new(agent_id: AgentId, variant: PolicyVariant) -> Self {
        Self {
            agent_id,
            source_platform_identity: None,
            enterprise_identity: None,
            enterprise_object_id: None,
            roles: BTreeSet::new(),
            permissions: BTreeMap::new(),
            created_at: Utc::now(),
            last_verified_at: None,
            security_context: variant
                .tracks_security_context()
                .then(SecurityContext::default),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Set `permissions[name] = true`
    pub fn grant(&mut self, name: impl Into<String>) {
        self.permissions
            .insert(name.into(), PermissionEffect::Flag(true));
    }

    /// Add entries to the permission map, overwriting same-named ones
    pub fn merge_permissions(&mut self, entries: BTreeMap<String, PermissionEffect>) {
        self.permissions.extend(entries);
    }

    pub fn is_granted(&self, name: &str) -> bool {
        self.permissions
            .get(name)
            .map(PermissionEffect::is_granted)
            .unwrap_or(false)
    }

    pub fn mark_verified(&mut self) {
        self.last_verified_at = Some(Utc::now());
    }
}
