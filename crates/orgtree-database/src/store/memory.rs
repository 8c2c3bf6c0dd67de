//! In-memory tree store using a Tokio `RwLock` for single-process use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use orgtree_core::config::HierarchyConfig;
use orgtree_core::error::AppError;
use orgtree_core::result::AppResult;
use orgtree_core::types::{PageRequest, PageResponse};
use orgtree_entity::node::{EntityFilter, EntityNode, NewEntityNode, StructuralChange};

use super::{NameQuery, TreeStore};

/// Internal state for the memory-based store.
#[derive(Debug, Default)]
struct InnerState {
    /// Every entity ever inserted, including tombstones.
    nodes: HashMap<Uuid, EntityNode>,
    /// Insertion order; the stored order for siblings.
    order: Vec<Uuid>,
}

impl InnerState {
    fn active_in(&self, tenant_id: Uuid) -> impl Iterator<Item = &EntityNode> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(move |n| n.tenant_id == tenant_id && n.is_active())
    }

    fn active(&self, id: Uuid, tenant_id: Uuid) -> Option<&EntityNode> {
        self.nodes
            .get(&id)
            .filter(|n| n.tenant_id == tenant_id && n.is_active())
    }

    /// Fail when an active entity already holds the claimed name.
    fn check_name(&self, claim: Option<&NameQuery<'_>>) -> AppResult<()> {
        match claim {
            Some(query) if self.nodes.values().any(|n| n.is_active() && query.matches(n)) => {
                Err(query.conflict())
            }
            _ => Ok(()),
        }
    }

    /// Confirm a row can be written at the expected version.
    fn check_version(&self, id: Uuid, tenant_id: Uuid, expected: i64) -> AppResult<()> {
        match self.active(id, tenant_id) {
            None => Err(AppError::not_found(format!("Entity {id} not found"))),
            Some(node) if node.version != expected => {
                warn!(
                    entity_id = %id,
                    expected_version = expected,
                    actual_version = node.version,
                    "Stale entity version, rejecting change"
                );
                Err(AppError::conflict(format!(
                    "Entity {id} was modified concurrently"
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

/// In-memory implementation of [`TreeStore`].
///
/// Readers share the lock; a commit holds the write lock for its whole
/// validate-then-apply sequence, so readers never see half a cascade.
#[derive(Debug, Clone)]
pub struct MemoryTreeStore {
    state: Arc<RwLock<InnerState>>,
    separator: String,
}

impl MemoryTreeStore {
    /// Creates an empty store splitting paths the way `config` builds them.
    pub fn new(config: &HierarchyConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(InnerState::default())),
            separator: config.path_separator.clone(),
        }
    }

    /// Fetch an entity regardless of its state.
    pub async fn get_any(&self, id: Uuid) -> Option<EntityNode> {
        self.state.read().await.nodes.get(&id).cloned()
    }

    /// Overwrite the path and level of a stored entity without a version
    /// check, to reproduce drifted data.
    pub async fn force_path(&self, id: Uuid, path: &str, level: i32) {
        let mut state = self.state.write().await;
        if let Some(node) = state.nodes.get_mut(&id) {
            node.path = path.to_string();
            node.level = level;
        }
    }
}

/// Split a path into the segments used as its sort key.
fn segment_key(path: &str, separator: &str) -> Vec<String> {
    path.split(separator).map(str::to_owned).collect()
}

/// Depth-first order from the roots, siblings by `(name, id)`, so that
/// entities sharing a path still have their subtrees kept apart. Entities
/// no root reaches (broken parent links) follow in path order.
fn preorder(nodes: Vec<EntityNode>, separator: &str) -> Vec<EntityNode> {
    let ids: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let mut ordered = Vec::with_capacity(nodes.len());
    let mut stranded = Vec::new();
    let mut by_parent: HashMap<Option<Uuid>, Vec<EntityNode>> = HashMap::new();
    for node in nodes {
        match node.parent_id {
            Some(parent_id) if !ids.contains(&parent_id) => stranded.push(node),
            parent_id => by_parent.entry(parent_id).or_default().push(node),
        }
    }
    // Largest first, so popping yields the smallest sibling.
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| (b.name.as_str(), b.id).cmp(&(a.name.as_str(), a.id)));
    }

    let mut stack = by_parent.remove(&None).unwrap_or_default();
    while let Some(node) = stack.pop() {
        if let Some(children) = by_parent.remove(&Some(node.id)) {
            stack.extend(children);
        }
        ordered.push(node);
    }

    stranded.extend(by_parent.into_values().flatten());
    stranded.sort_by_cached_key(|n| (segment_key(&n.path, separator), n.id));
    ordered.extend(stranded);
    ordered
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    fn separator(&self) -> &str {
        &self.separator
    }

    async fn get_active(&self, id: Uuid, tenant_id: Uuid) -> AppResult<EntityNode> {
        self.state
            .read()
            .await
            .active(id, tenant_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Entity {id} not found")))
    }

    async fn locate(&self, id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self
            .state
            .read()
            .await
            .nodes
            .get(&id)
            .filter(|n| n.is_active())
            .map(|n| n.tenant_id))
    }

    async fn children_of(&self, id: Uuid, tenant_id: Uuid) -> AppResult<Vec<EntityNode>> {
        let state = self.state.read().await;
        Ok(state
            .active_in(tenant_id)
            .filter(|n| n.parent_id == Some(id))
            .cloned()
            .collect())
    }

    async fn count_active_children(&self, id: Uuid, tenant_id: Uuid) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .active_in(tenant_id)
            .filter(|n| n.parent_id == Some(id))
            .count() as u64)
    }

    fn list_under_tenant(&self, tenant_id: Uuid) -> BoxStream<'_, AppResult<EntityNode>> {
        let state = Arc::clone(&self.state);
        let separator = self.separator.clone();

        stream::once(async move {
            let nodes: Vec<EntityNode> =
                state.read().await.active_in(tenant_id).cloned().collect();
            stream::iter(preorder(nodes, &separator).into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &EntityFilter,
        page: &PageRequest,
    ) -> AppResult<PageResponse<EntityNode>> {
        let mut matching: Vec<EntityNode> = {
            let state = self.state.read().await;
            state
                .active_in(tenant_id)
                .filter(|n| filter.matches(n))
                .cloned()
                .collect()
        };
        matching.sort_by_cached_key(|n| (segment_key(&n.path, &self.separator), n.id));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(PageResponse::new(items, page, total))
    }

    async fn name_in_use(&self, query: &NameQuery<'_>) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .any(|n| n.is_active() && query.matches(n)))
    }

    async fn insert(
        &self,
        node: NewEntityNode,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode> {
        let mut state = self.state.write().await;
        state.check_name(claim)?;

        if let Some(parent_id) = node.parent_id {
            if state.active(parent_id, node.tenant_id).is_none() {
                return Err(AppError::not_found(format!(
                    "Parent entity {parent_id} not found"
                )));
            }
        }

        let id = Uuid::new_v4();
        let node = node.into_node(id, Utc::now());
        state.nodes.insert(id, node.clone());
        state.order.push(id);
        Ok(node)
    }

    async fn commit(
        &self,
        change: StructuralChange,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode> {
        let mut state = self.state.write().await;
        let tenant_id = change.tenant_id;

        state.check_name(claim)?;
        state.check_version(change.head.id, tenant_id, change.head.expected_version)?;
        for update in &change.cascade {
            state.check_version(update.id, tenant_id, update.expected_version)?;
        }

        let now = Utc::now();
        for update in &change.cascade {
            if let Some(node) = state.nodes.get_mut(&update.id) {
                node.path = update.path.clone();
                node.level = update.level;
                node.version += 1;
                node.updated_at = now;
            }
        }

        let head = state
            .nodes
            .get_mut(&change.head.id)
            .ok_or_else(|| AppError::not_found(format!("Entity {} not found", change.head.id)))?;
        change.head.changes.apply_to(head);
        head.version += 1;
        head.updated_at = now;
        Ok(head.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgtree_core::ErrorKind;
    use orgtree_entity::node::{EntityType, NodeChanges, NodeState, NodeUpdate, PathUpdate};

    use crate::store::NameScope;

    fn new_node(tenant_id: Uuid, parent: Option<&EntityNode>, name: &str) -> NewEntityNode {
        let (path, level) = match parent {
            Some(p) => (format!("{} > {name}", p.path), p.level + 1),
            None => (name.to_string(), 0),
        };
        NewEntityNode {
            tenant_id,
            name: name.to_string(),
            entity_type: EntityType::Department,
            parent_id: parent.map(|p| p.id),
            path,
            level,
            metadata: serde_json::json!({}),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();

        let err = store.get_active(acme.id, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(store.locate(acme.id).await.unwrap(), Some(tenant));
    }

    #[tokio::test]
    async fn test_children_in_insertion_order() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        let zeta = store.insert(new_node(tenant, Some(&acme), "Zeta"), None).await.unwrap();
        let alpha = store.insert(new_node(tenant, Some(&acme), "Alpha"), None).await.unwrap();

        let children = store.children_of(acme.id, tenant).await.unwrap();
        let ids: Vec<Uuid> = children.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![zeta.id, alpha.id]);
        assert_eq!(store.count_active_children(acme.id, tenant).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_under_tenant_is_preorder() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        // "Acme!" sorts before "Acme > Sales" bytewise but is a sibling root.
        store.insert(new_node(tenant, None, "Acme!"), None).await.unwrap();
        store.insert(new_node(tenant, Some(&acme), "Sales"), None).await.unwrap();

        let paths: Vec<String> = store
            .list_under_tenant(tenant)
            .map(|n| n.unwrap().path)
            .collect()
            .await;
        assert_eq!(paths, vec!["Acme", "Acme > Sales", "Acme!"]);
    }

    #[tokio::test]
    async fn test_list_under_tenant_keeps_same_path_subtrees_apart() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        let first = store.insert(new_node(tenant, Some(&acme), "Ops"), None).await.unwrap();
        let second = store.insert(new_node(tenant, Some(&acme), "Ops"), None).await.unwrap();
        let east = store.insert(new_node(tenant, Some(&first), "East"), None).await.unwrap();
        let west = store.insert(new_node(tenant, Some(&second), "West"), None).await.unwrap();

        let (lower, upper) = if first.id < second.id {
            (first.id, east.id)
        } else {
            (second.id, west.id)
        };

        let nodes: Vec<EntityNode> = store
            .list_under_tenant(tenant)
            .map(|n| n.unwrap())
            .collect()
            .await;
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[1].id, lower);
        assert_eq!(nodes[2].id, upper);
        for (i, node) in nodes.iter().enumerate() {
            if let Some(parent_id) = node.parent_id {
                assert!(nodes[..i].iter().any(|p| p.id == parent_id));
            }
        }
    }

    #[tokio::test]
    async fn test_list_under_tenant_appends_stranded_entities() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        let sales = store.insert(new_node(tenant, Some(&acme), "Sales"), None).await.unwrap();
        store.insert(new_node(tenant, Some(&sales), "EMEA"), None).await.unwrap();
        store.insert(new_node(tenant, None, "Zeta"), None).await.unwrap();

        store
            .update_fields(
                tenant,
                NodeUpdate {
                    id: sales.id,
                    expected_version: sales.version,
                    changes: NodeChanges {
                        state: Some(NodeState::Inactive),
                        ..NodeChanges::default()
                    },
                },
            )
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_under_tenant(tenant)
            .map(|n| n.unwrap().name)
            .collect()
            .await;
        assert_eq!(names, vec!["Acme", "Zeta", "EMEA"]);
    }

    #[tokio::test]
    async fn test_name_claim_is_checked_under_write_lock() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let claim = NameQuery {
            name: "Acme",
            scope: NameScope::Global,
            exclude_id: None,
        };

        store
            .insert(new_node(Uuid::new_v4(), None, "Acme"), Some(&claim))
            .await
            .unwrap();
        let err = store
            .insert(new_node(Uuid::new_v4(), None, "Acme"), Some(&claim))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_commit_rejects_claimed_name_and_changes_nothing() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        let globex = store.insert(new_node(tenant, None, "Globex"), None).await.unwrap();

        let claim = NameQuery {
            name: "Acme",
            scope: NameScope::Tenant(tenant),
            exclude_id: Some(globex.id),
        };
        let change = StructuralChange::single(
            tenant,
            NodeUpdate {
                id: globex.id,
                expected_version: globex.version,
                changes: NodeChanges {
                    name: Some("Acme".to_string()),
                    path: Some("Acme".to_string()),
                    ..NodeChanges::default()
                },
            },
        );

        let err = store.commit(change, Some(&claim)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(store.get_any(globex.id).await.unwrap().name, "Globex");
    }

    #[tokio::test]
    async fn test_commit_with_stale_cascade_changes_nothing() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();
        let sales = store.insert(new_node(tenant, Some(&acme), "Sales"), None).await.unwrap();
        let emea = store.insert(new_node(tenant, Some(&sales), "EMEA"), None).await.unwrap();

        let change = StructuralChange {
            tenant_id: tenant,
            head: NodeUpdate {
                id: acme.id,
                expected_version: acme.version,
                changes: NodeChanges {
                    name: Some("Acme Corp".to_string()),
                    path: Some("Acme Corp".to_string()),
                    ..NodeChanges::default()
                },
            },
            cascade: vec![
                PathUpdate {
                    id: sales.id,
                    expected_version: sales.version,
                    path: "Acme Corp > Sales".to_string(),
                    level: 1,
                },
                PathUpdate {
                    id: emea.id,
                    expected_version: emea.version + 7,
                    path: "Acme Corp > Sales > EMEA".to_string(),
                    level: 2,
                },
            ],
        };

        let err = store.commit(change, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        assert_eq!(store.get_any(acme.id).await.unwrap().path, "Acme");
        assert_eq!(store.get_any(sales.id).await.unwrap().path, "Acme > Sales");
        assert_eq!(store.get_any(sales.id).await.unwrap().version, sales.version);
    }

    #[tokio::test]
    async fn test_update_fields_bumps_version() {
        let store = MemoryTreeStore::new(&HierarchyConfig::default());
        let tenant = Uuid::new_v4();
        let acme = store.insert(new_node(tenant, None, "Acme"), None).await.unwrap();

        let updated = store
            .update_fields(
                tenant,
                NodeUpdate {
                    id: acme.id,
                    expected_version: acme.version,
                    changes: NodeChanges {
                        metadata: Some(serde_json::json!({"region": "eu"})),
                        ..NodeChanges::default()
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version, acme.version + 1);
        assert_eq!(updated.metadata["region"], "eu");
    }
}
