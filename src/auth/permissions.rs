//! Roles, actions and the permission table
//!
//! Role names and action names are closed enumerations. The hierarchy and
//! the matrix are one table configured per [`PolicyVariant`]: the baseline
//! variant knows the seven core actions, the extended variant adds `audit`,
//! `configure` and the `auditor` role.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::types::{NodeError, Result};

/// Role tag held by an agent identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Contributor,
    Reader,
    Auditor,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::Admin,
        Role::Contributor,
        Role::Reader,
        Role::Auditor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Contributor => "contributor",
            Role::Reader => "reader",
            Role::Auditor => "auditor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "contributor" => Ok(Role::Contributor),
            "reader" => Ok(Role::Reader),
            "auditor" => Ok(Role::Auditor),
            other => Err(NodeError::InvalidPolicy(format!("unknown role: {}", other))),
        }
    }
}

/// Action a role may be allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Delegate,
    Inherit,
    Override,
    Audit,
    Configure,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Delegate,
        Action::Inherit,
        Action::Override,
        Action::Audit,
        Action::Configure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Delegate => "delegate",
            Action::Inherit => "inherit",
            Action::Override => "override",
            Action::Audit => "audit",
            Action::Configure => "configure",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| NodeError::InvalidPolicy(format!("unknown action: {}", s)))
    }
}

/// Which of the two policy tables a tree runs with.
///
/// The extended variant also switches on the audit log and the identity
/// security context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVariant {
    Baseline,
    #[default]
    Extended,
}

impl PolicyVariant {
    pub fn audits(&self) -> bool {
        matches!(self, PolicyVariant::Extended)
    }

    pub fn tracks_security_context(&self) -> bool {
        matches!(self, PolicyVariant::Extended)
    }
}

impl FromStr for PolicyVariant {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(PolicyVariant::Baseline),
            "extended" => Ok(PolicyVariant::Extended),
            other => Err(NodeError::Config(format!("unknown policy variant: {}", other))),
        }
    }
}

/// One matrix row: action -> allowed
pub type PermissionRow = BTreeMap<Action, bool>;

/// Role hierarchy plus permission matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    variant: PolicyVariant,
    hierarchy: BTreeMap<Role, BTreeSet<Role>>,
    matrix: BTreeMap<Role, PermissionRow>,
}

fn row(actions: &[Action], granted: &[Action]) -> PermissionRow {
    actions.iter().map(|a| (*a, granted.contains(a))).collect()
}

impl PolicyTable {
    /// Table for the given variant
    pub fn for_variant(variant: PolicyVariant) -> Self {
        match variant {
            PolicyVariant::Baseline => Self::baseline(),
            PolicyVariant::Extended => Self::extended(),
        }
    }

    pub fn baseline() -> Self {
        use Action::*;
        let actions = [Create, Read, Update, Delete, Delegate, Inherit, Override];

        let hierarchy = BTreeMap::from([
            (Role::Owner, BTreeSet::from([Role::Admin, Role::Contributor, Role::Reader])),
            (Role::Admin, BTreeSet::from([Role::Contributor, Role::Reader])),
            (Role::Contributor, BTreeSet::from([Role::Reader])),
            (Role::Reader, BTreeSet::new()),
        ]);

        let matrix = BTreeMap::from([
            (Role::Owner, row(&actions, &actions)),
            (
                Role::Admin,
                row(&actions, &[Create, Read, Update, Delete, Delegate, Inherit]),
            ),
            (Role::Contributor, row(&actions, &[Create, Read, Update, Inherit])),
            (Role::Reader, row(&actions, &[Read])),
        ]);

        Self {
            variant: PolicyVariant::Baseline,
            hierarchy,
            matrix,
        }
    }

    pub fn extended() -> Self {
        use Action::*;
        let actions = Action::ALL;

        let hierarchy = BTreeMap::from([
            (
                Role::Owner,
                BTreeSet::from([Role::Admin, Role::Contributor, Role::Reader, Role::Auditor]),
            ),
            (
                Role::Admin,
                BTreeSet::from([Role::Contributor, Role::Reader, Role::Auditor]),
            ),
            (Role::Contributor, BTreeSet::from([Role::Reader])),
            (Role::Reader, BTreeSet::new()),
            (Role::Auditor, BTreeSet::from([Role::Reader])),
        ]);

        let matrix = BTreeMap::from([
            (Role::Owner, row(&actions, &actions)),
            (
                Role::Admin,
                row(
                    &actions,
                    &[Create, Read, Update, Delete, Delegate, Inherit, Audit, Configure],
                ),
            ),
            (Role::Contributor, row(&actions, &[Create, Read, Update, Inherit])),
            (Role::Reader, row(&actions, &[Read])),
            (Role::Auditor, row(&actions, &[Read, Audit])),
        ]);

        Self {
            variant: PolicyVariant::Extended,
            hierarchy,
            matrix,
        }
    }

    /// Build a custom table. Fails if the table is not a valid hierarchy.
    pub fn custom(
        variant: PolicyVariant,
        hierarchy: BTreeMap<Role, BTreeSet<Role>>,
        matrix: BTreeMap<Role, PermissionRow>,
    ) -> Result<Self> {
        let table = Self {
            variant,
            hierarchy,
            matrix,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn variant(&self) -> PolicyVariant {
        self.variant
    }

    /// Whether `role` maps `action` to true. Roles or actions missing from
    /// the table are denied.
    pub fn allows(&self, role: Role, action: Action) -> bool {
        self.matrix
            .get(&role)
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or(false)
    }

    /// Roles directly subsumed by `role` (one hop)
    pub fn subsumes(&self, role: Role) -> Option<&BTreeSet<Role>> {
        self.hierarchy.get(&role)
    }

    /// All roles reachable from `role` through the hierarchy, excluding itself
    pub fn subsumes_transitively(&self, role: Role) -> BTreeSet<Role> {
        let mut reached = BTreeSet::new();
        let mut stack: Vec<Role> = self
            .hierarchy
            .get(&role)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();

        while let Some(next) = stack.pop() {
            if reached.insert(next) {
                if let Some(children) = self.hierarchy.get(&next) {
                    stack.extend(children.iter().copied());
                }
            }
        }
        reached
    }

    /// Matrix row for a role
    pub fn row(&self, role: Role) -> Option<&PermissionRow> {
        self.matrix.get(&role)
    }

    /// Roles known to the table
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.matrix.keys().copied()
    }

    /// Check structural rules: acyclic hierarchy, terminal `reader`, and a
    /// matrix row for every role in the hierarchy.
    pub fn validate(&self) -> Result<()> {
        if let Some(reader) = self.hierarchy.get(&Role::Reader) {
            if !reader.is_empty() {
                return Err(NodeError::InvalidPolicy(
                    "reader must not subsume other roles".into(),
                ));
            }
        }

        for (role, subsumed) in &self.hierarchy {
            if !self.matrix.contains_key(role) {
                return Err(NodeError::InvalidPolicy(format!(
                    "role {} has no permission row",
                    role
                )));
            }
            for child in subsumed {
                if !self.hierarchy.contains_key(child) {
                    return Err(NodeError::InvalidPolicy(format!(
                        "role {} subsumes unknown role {}",
                        role, child
                    )));
                }
            }
            if self.subsumes_transitively(*role).contains(role) {
                return Err(NodeError::InvalidPolicy(format!(
                    "role hierarchy has a cycle through {}",
                    role
                )));
            }
        }

        Ok(())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::extended()
    }
}
