//! Recursive node orchestration
//!
//! A [`NodeTree`] is an arena of [`Node`]s keyed by agent id. Each node
//! owns its policy engine (and through it its identity record), the ids of
//! its children in spawn order, and a non-owning parent id.
//!
//! Initialization of a node runs to completion, including every child it
//! spawns, before control returns to the caller. Children are spawned one
//! at a time in manifest order.

pub mod manifest;

pub use manifest::{ChildSpec, Manifest, RecursiveSettings, DEFAULT_MAX_DEPTH};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::authenticator::{AuthConfig, Authenticator};
use crate::auth::permissions::{Action, PolicyTable, PolicyVariant, Role};
use crate::auth::policy::PolicyEngine;
use crate::identity::{AgentId, AgentIdentity, Domain, PermissionEffect};
use crate::logging::{EventLogger, EventType, NodeEvent};
use crate::types::{NodeError, Recovery, Result};

/// Settings shared by every node of a tree
#[derive(Clone, Default)]
pub struct TreeOptions {
    pub table: Arc<PolicyTable>,
    pub manifest: Manifest,
    pub auth: AuthConfig,
    pub events: EventLogger,
}

impl TreeOptions {
    pub fn new(variant: PolicyVariant) -> Self {
        Self {
            table: Arc::new(PolicyTable::for_variant(variant)),
            ..Default::default()
        }
    }

    pub fn with_table(mut self, table: PolicyTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_events(mut self, events: EventLogger) -> Self {
        self.events = events;
        self
    }
}

pub struct Node {
    domain: Domain,
    policy: PolicyEngine,
    parent: Option<AgentId>,
    children: Vec<AgentId>,
}

impl Node {
    pub fn agent_id(&self) -> &AgentId {
        &self.policy.identity().agent_id
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn identity(&self) -> &AgentIdentity {
        self.policy.identity()
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut PolicyEngine {
        &mut self.policy
    }

    pub fn parent(&self) -> Option<&AgentId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[AgentId] {
        &self.children
    }
}

/// Serializable view of a node and its descendants
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub agent_id: AgentId,
    pub domain: String,
    pub depth: usize,
    pub roles: BTreeSet<Role>,
    pub source_platform_identity: Option<String>,
    pub enterprise_identity: Option<String>,
    pub enterprise_object_id: Option<String>,
    pub permissions: BTreeMap<String, PermissionEffect>,
    pub audit_enabled: bool,
    pub children: Vec<NodeSummary>,
}

impl NodeSummary {
    /// Nodes in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeSummary::count).sum::<usize>()
    }
}

pub struct NodeTree {
    nodes: HashMap<AgentId, Node>,
    root: AgentId,
    table: Arc<PolicyTable>,
    manifest: Manifest,
    auth: AuthConfig,
    events: EventLogger,
}

impl NodeTree {
    /// Create a tree holding a single, uninitialized root node.
    pub fn new(domain: Domain, options: TreeOptions) -> Self {
        let TreeOptions {
            table,
            manifest,
            auth,
            events,
        } = options;

        let mut tree = Self {
            nodes: HashMap::new(),
            root: AgentId::from_raw(String::new()),
            table,
            manifest,
            auth,
            events,
        };
        tree.root = tree.insert_node(domain.clone(), &domain, None);
        tree
    }

    pub fn root(&self) -> &AgentId {
        &self.root
    }

    pub fn node(&self, id: &AgentId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &AgentId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn variant(&self) -> PolicyVariant {
        self.table.variant()
    }

    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    /// Draw an agent id not used by any live node
    fn allocate_id(&self, domain: &Domain) -> AgentId {
        loop {
            let id = AgentId::generate(domain);
            if !self.nodes.contains_key(&id) {
                return id;
            }
            debug!("Agent id {} already in use, drawing again", id);
        }
    }

    /// Add a node. `id_domain` is the domain tag minted into its agent id.
    fn insert_node(
        &mut self,
        domain: Domain,
        id_domain: &Domain,
        parent: Option<AgentId>,
    ) -> AgentId {
        let id = self.allocate_id(id_domain);
        let identity = AgentIdentity::new(id.clone(), self.table.variant());
        let policy = PolicyEngine::new(identity, Arc::clone(&self.table), self.events.clone());

        info!("Created node {} in domain {}", id, domain);
        self.events
            .log(NodeEvent::new(EventType::NodeCreated, &id).with_detail(domain.to_string()));

        self.nodes.insert(
            id.clone(),
            Node {
                domain,
                policy,
                parent,
                children: Vec::new(),
            },
        );
        id
    }

    /// Replace a node's roles with its domain's default set.
    pub fn assign_default_roles(&mut self, id: &AgentId) -> Result<BTreeSet<Role>> {
        let variant = self.table.variant();
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| NodeError::NotFound(id.to_string()))?;

        let roles = node.domain.default_roles(variant);
        node.policy.assign_roles(roles.clone());
        info!(
            "Assigned roles [{}] to {}",
            roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", "),
            id
        );
        Ok(roles)
    }

    /// Authenticate, bind identities, assign roles and, when the manifest
    /// enables it, spawn children. Returns false on failure; never errors.
    pub fn initialize<'a>(&'a mut self, id: &AgentId) -> BoxFuture<'a, bool> {
        let id = id.clone();
        async move {
            match self.run_initialize(&id).await {
                Ok(()) => {
                    info!("Node {} initialized", id);
                    self.events
                        .log(NodeEvent::new(EventType::NodeInitialized, &id));
                    true
                }
                Err(err) => {
                    error!("Failed to initialize node {}: {}", id, err);
                    self.events.log(
                        NodeEvent::new(EventType::NodeInitFailed, &id).with_detail(err.to_string()),
                    );
                    false
                }
            }
        }
        .boxed()
    }

    async fn run_initialize(&mut self, id: &AgentId) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(NodeError::NotFound(id.to_string()));
        }

        let mut authenticator = Authenticator::new(self.auth.clone(), id.clone(), self.events.clone());
        let token = authenticator.authenticate().await;
        let platform_token = authenticator.platform_token();

        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| NodeError::NotFound(id.to_string()))?;
        let identity = node.policy.identity_mut();
        authenticator
            .bind_source_platform_identity(identity, platform_token.as_deref())
            .await;
        authenticator
            .bind_enterprise_identity(identity, &token.access_token)
            .await;

        self.assign_default_roles(id)?;

        if self.manifest.recursive.enabled {
            self.initialize_recursive_structure(id).await;
        }
        Ok(())
    }

    /// Spawn one child per manifest entry, in order, while the node is
    /// shallower than `max_depth`. Returns the number of children added.
    pub async fn initialize_recursive_structure(&mut self, id: &AgentId) -> usize {
        if !self.manifest.recursive.enabled {
            return 0;
        }

        let Some(depth) = self.get_depth(id) else {
            return 0;
        };
        let max_depth = self.manifest.recursive.max_depth;
        if depth >= max_depth {
            debug!("Node {} at depth {} reached max depth {}", id, depth, max_depth);
            return 0;
        }

        let specs = self.manifest.children.clone();
        let mut spawned = 0;
        for spec in &specs {
            if self.spawn_child(id, spec).await.is_some() {
                spawned += 1;
            }
        }

        info!(
            "Node {} spawned {} of {} child node(s)",
            id,
            spawned,
            specs.len()
        );
        spawned
    }

    /// Create, link and initialize a child of `parent`.
    ///
    /// The child's permission map is seeded with the rows it inherits from
    /// the parent before its own initialization starts.
    pub async fn spawn_child(&mut self, parent: &AgentId, spec: &ChildSpec) -> Option<AgentId> {
        let child = match self.construct_child(parent, spec) {
            Ok(child) => child,
            Err(err) => {
                self.spawn_failed(parent, &err);
                return None;
            }
        };

        // Binding failures inside are soft; a child in the arena always
        // finishes initializing.
        self.initialize(&child).await;

        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child.clone());
        }
        info!("Spawned child {} under {}", child, parent);
        self.events
            .log(NodeEvent::new(EventType::ChildSpawned, parent).with_target(&child));
        Some(child)
    }

    fn construct_child(&mut self, parent: &AgentId, spec: &ChildSpec) -> Result<AgentId> {
        let depth = self
            .get_depth(parent)
            .ok_or_else(|| NodeError::NotFound(parent.to_string()))?;

        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| NodeError::NotFound(parent.to_string()))?;

        if !parent_node.policy.check(Action::Create) {
            return Err(NodeError::permission_denied(
                parent.as_str(),
                Action::Create.as_str(),
            ));
        }

        let max_depth = self.manifest.recursive.max_depth;
        if depth >= max_depth {
            return Err(NodeError::SpawnFailed(format!(
                "{} is at depth {}, max depth is {}",
                parent, depth, max_depth
            )));
        }

        let parent_domain = parent_node.domain.clone();
        let domain = spec
            .domain
            .as_deref()
            .map(Domain::parse)
            .unwrap_or_else(|| parent_domain.clone());
        let parent_identity = parent_node.policy.identity().clone();

        // Child ids are minted by the spawning node, under its domain
        let child = self.insert_node(domain, &parent_domain, Some(parent.clone()));
        let variant = self.table.variant();
        let node = self
            .nodes
            .get_mut(&child)
            .ok_or_else(|| NodeError::Internal(format!("child {} vanished", child)))?;

        // Roles first, so inheritance sees what the child will hold
        let roles = node.domain.default_roles(variant);
        node.policy.assign_roles(roles);
        let inherited = node.policy.inherit_permissions(&parent_identity);
        node.policy.identity_mut().merge_permissions(inherited);

        Ok(child)
    }

    fn spawn_failed(&self, parent: &AgentId, err: &NodeError) {
        match err.recovery() {
            Recovery::Deny => warn!("Spawn refused for {}: {}", parent, err),
            _ => error!("Spawn failed under {}: {}", parent, err),
        }
        self.events
            .log(NodeEvent::new(EventType::SpawnFailed, parent).with_detail(err.to_string()));
    }

    /// Number of parent links between `id` and the root
    pub fn get_depth(&self, id: &AgentId) -> Option<usize> {
        let mut node = self.nodes.get(id)?;
        let mut depth = 0;
        while let Some(parent) = &node.parent {
            node = self.nodes.get(parent)?;
            depth += 1;
            if depth > self.nodes.len() {
                return None;
            }
        }
        Some(depth)
    }

    /// Depth-first search of the subtree rooted at `from`: the node itself,
    /// then each child's subtree in spawn order.
    pub fn find_by_agent_id(&self, from: &AgentId, target: &AgentId) -> Option<&Node> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id)?;
            if node.agent_id() == target {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Grant `permission` to the node `target` in the delegator's subtree.
    ///
    /// Gated only by the delegator's `delegate` action. The grant is not
    /// checked against the role hierarchy (`PolicyEngine::can_delegate_to`).
    pub fn delegate_permission(
        &mut self,
        delegator: &AgentId,
        target: &AgentId,
        permission: &str,
    ) -> bool {
        let Some(node) = self.nodes.get_mut(delegator) else {
            warn!("Unknown delegator {}", delegator);
            return false;
        };
        if !node.policy.check(Action::Delegate) {
            return false;
        }

        let Some(found) = self
            .find_by_agent_id(delegator, target)
            .map(|n| n.agent_id().clone())
        else {
            warn!("Delegation target {} not found under {}", target, delegator);
            return false;
        };

        let Some(target_node) = self.nodes.get_mut(&found) else {
            return false;
        };
        target_node.policy.identity_mut().grant(permission);

        info!("Delegated {} from {} to {}", permission, delegator, found);
        self.events.log(
            NodeEvent::new(EventType::PermissionDelegated, delegator)
                .with_target(&found)
                .with_detail(permission.to_string()),
        );
        true
    }

    /// Summary of the whole tree
    pub fn summary(&self) -> Option<NodeSummary> {
        self.summarize(&self.root, 0)
    }

    fn summarize(&self, id: &AgentId, depth: usize) -> Option<NodeSummary> {
        let node = self.nodes.get(id)?;
        let identity = node.identity();
        Some(NodeSummary {
            agent_id: id.clone(),
            domain: node.domain.to_string(),
            depth,
            roles: identity.roles.clone(),
            source_platform_identity: identity.source_platform_identity.clone(),
            enterprise_identity: identity.enterprise_identity.clone(),
            enterprise_object_id: identity.enterprise_object_id.clone(),
            permissions: identity.permissions.clone(),
            audit_enabled: node.policy.audit_log().is_some(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.summarize(child, depth + 1))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(domain: &str, manifest: Manifest) -> NodeTree {
        NodeTree::new(
            Domain::parse(domain),
            TreeOptions::new(PolicyVariant::Extended).with_manifest(manifest),
        )
    }

    #[test]
    fn test_new_tree_has_uninitialized_root() {
        let tree = tree("Personal", Manifest::default());
        let root = tree.node(tree.root()).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(root.parent().is_none());
        assert!(root.identity().roles.is_empty());
        assert_eq!(tree.get_depth(tree.root()), Some(0));
        assert!(tree.root().as_str().starts_with("PA-PERSONAL-"));
    }

    #[test]
    fn test_assign_default_roles_unknown_node() {
        let mut tree = tree("Personal", Manifest::default());
        let err = tree
            .assign_default_roles(&AgentId::from_raw("PA-NOPE"))
            .unwrap_err();
        assert!(matches!(err, NodeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_child_inherits_before_initialize() {
        let mut tree = tree("Family", Manifest::default());
        let root = tree.root().clone();
        tree.assign_default_roles(&root).unwrap();

        let child = tree
            .spawn_child(&root, &ChildSpec::new("Business"))
            .await
            .unwrap();

        let node = tree.node(&child).unwrap();
        assert_eq!(node.parent(), Some(&root));
        assert_eq!(node.identity().roles, BTreeSet::from([Role::Contributor]));
        // admin subsumes contributor, so the contributor row is inherited
        assert!(node.identity().permissions.contains_key("contributor"));
        assert_eq!(tree.node(&root).unwrap().children(), &[child.clone()]);
    }

    #[tokio::test]
    async fn test_child_without_domain_takes_parents() {
        let mut tree = tree("Family", Manifest::default());
        let root = tree.root().clone();
        tree.assign_default_roles(&root).unwrap();

        let child = tree
            .spawn_child(&root, &ChildSpec::same_domain())
            .await
            .unwrap();
        assert_eq!(tree.node(&child).unwrap().domain(), &Domain::Family);
    }

    #[tokio::test]
    async fn test_child_id_carries_spawner_domain() {
        let mut tree = tree("Family", Manifest::default());
        let root = tree.root().clone();
        tree.assign_default_roles(&root).unwrap();

        let child = tree
            .spawn_child(&root, &ChildSpec::new("Business"))
            .await
            .unwrap();
        assert_eq!(tree.node(&child).unwrap().domain(), &Domain::Business);
        assert!(child.as_str().starts_with("PA-FAMILY-"), "{}", child);
        assert!(child.is_well_formed());

        let grandchild = tree
            .spawn_child(&child, &ChildSpec::new("Personal"))
            .await
            .unwrap();
        assert!(grandchild.as_str().starts_with("PA-BUSINESS-"), "{}", grandchild);
    }

    #[tokio::test]
    async fn test_initialize_unknown_node_fails() {
        let mut tree = tree("Family", Manifest::default());
        let missing = AgentId::from_raw("PA-FAMILY-20260101000000-00000000");

        assert!(!tree.initialize(&missing).await);
        let failed = tree.events().events_of(EventType::NodeInitFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].agent_id, missing);
        assert!(tree.events().events_of(EventType::NodeInitialized).is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_beyond_depth_is_omitted() {
        let manifest = Manifest {
            recursive: RecursiveSettings {
                enabled: false,
                max_depth: 0,
            },
            children: Vec::new(),
        };
        let mut tree = tree("Personal", manifest);
        let root = tree.root().clone();
        tree.assign_default_roles(&root).unwrap();

        assert!(tree.spawn_child(&root, &ChildSpec::same_domain()).await.is_none());
        assert!(tree.node(&root).unwrap().children().is_empty());
        let failed = tree.events().events_of(EventType::SpawnFailed);
        assert_eq!(failed.len(), 1);
        assert!(failed[0].detail.as_deref().unwrap_or("").contains("max depth"));
    }

    #[tokio::test]
    async fn test_spawn_denied_without_create() {
        let mut tree = tree("Guest", Manifest::default());
        let root = tree.root().clone();
        assert_eq!(
            tree.assign_default_roles(&root).unwrap(),
            BTreeSet::from([Role::Reader])
        );

        assert!(tree.spawn_child(&root, &ChildSpec::new("Business")).await.is_none());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.events().events_of(EventType::SpawnFailed).len(), 1);
    }

    #[tokio::test]
    async fn test_summary_counts_nodes() {
        let mut tree = tree("Family", Manifest::recursive(2, vec![ChildSpec::new("Business")]));
        let root = tree.root().clone();
        assert!(tree.initialize(&root).await);

        let summary = tree.summary().unwrap();
        assert_eq!(summary.count(), tree.len());
        assert_eq!(summary.children[0].depth, 1);
        assert!(summary.audit_enabled);
    }
}
