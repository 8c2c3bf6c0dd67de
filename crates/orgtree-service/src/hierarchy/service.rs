//! Entity hierarchy mutations and queries with full invariant enforcement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use orgtree_core::config::{HierarchyConfig, NameUniqueness};
use orgtree_core::error::{AppError, ErrorKind};
use orgtree_core::result::AppResult;
use orgtree_core::types::{PageRequest, PageResponse};
use orgtree_database::{DependentCounter, NameQuery, NameScope, TreeStore};
use orgtree_entity::node::{
    EntityFilter, EntityNode, EntityType, HierarchyStats, NewEntityNode, NodeChanges, NodeState,
    NodeUpdate, PathUpdate, StructuralChange,
};

use super::cycle::CycleGuard;
use super::lock::TenantLocks;
use super::path::PathBuilder;
use super::walker::DescendantWalker;
use crate::context::RequestContext;

/// Request to create a new entity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEntityRequest {
    /// Entity name.
    #[validate(length(min = 1, message = "Entity name is required"))]
    pub name: String,
    /// Entity kind.
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    /// Parent entity (None for a root).
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Key/value metadata.
    #[serde(default = "empty_metadata")]
    #[validate(custom(function = "validate_metadata"))]
    pub metadata: serde_json::Value,
}

impl CreateEntityRequest {
    /// A request for an entity with empty metadata.
    pub fn new(name: impl Into<String>, entity_type: EntityType, parent_id: Option<Uuid>) -> Self {
        Self {
            name: name.into(),
            entity_type,
            parent_id,
            metadata: empty_metadata(),
        }
    }
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn validate_metadata(metadata: &serde_json::Value) -> Result<(), ValidationError> {
    if metadata.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("metadata_not_object")
            .with_message("Metadata must be a JSON object".into()))
    }
}

/// Orchestrates path derivation, cycle checks, and cascades over a
/// [`TreeStore`].
///
/// Structural mutations for one tenant are serialized by [`TenantLocks`]
/// for the whole validate-walk-commit sequence. Under global name
/// uniqueness a name check spans tenants, so all mutations share one lock.
/// Every write also carries the version it was computed from and its name
/// claim, so a writer in another process can never interleave with a
/// cascade or take the same name.
#[derive(Debug, Clone)]
pub struct HierarchyService {
    /// Entity storage.
    store: Arc<dyn TreeStore>,
    /// Counts users and other records attached to an entity.
    dependents: Arc<dyn DependentCounter>,
    /// Tree-shape limits and naming policy.
    config: HierarchyConfig,
    /// Path and level derivation.
    paths: PathBuilder,
    /// Ancestry checks.
    cycles: CycleGuard,
    /// Cascade traversal.
    walker: DescendantWalker,
    /// Per-tenant mutation locks.
    locks: TenantLocks,
}

impl HierarchyService {
    /// Creates a new hierarchy service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        dependents: Arc<dyn DependentCounter>,
        config: HierarchyConfig,
    ) -> Self {
        debug_assert_eq!(
            store.separator(),
            config.path_separator,
            "store and hierarchy config disagree on the path separator"
        );
        Self {
            paths: PathBuilder::new(&config),
            cycles: CycleGuard::new(Arc::clone(&store), config.max_depth),
            walker: DescendantWalker::new(Arc::clone(&store)),
            locks: TenantLocks::new(),
            store,
            dependents,
            config,
        }
    }

    /// The hierarchy settings in effect.
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// The ancestry checker used for moves.
    pub fn cycle_guard(&self) -> &CycleGuard {
        &self.cycles
    }

    /// Gets an active entity by ID.
    pub async fn get(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
    ) -> AppResult<EntityNode> {
        self.store.get_active(id, tenant_id).await
    }

    /// Lists active entities matching a filter.
    pub async fn list(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
        filter: &EntityFilter,
        page: &PageRequest,
    ) -> AppResult<PageResponse<EntityNode>> {
        if let Some(max_level) = filter.max_level {
            if max_level < 0 {
                return Err(AppError::validation("max_level must not be negative"));
            }
        }
        self.store.list(tenant_id, filter, page).await
    }

    /// Lists the active direct children of an entity.
    pub async fn children(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
    ) -> AppResult<Vec<EntityNode>> {
        self.store.get_active(id, tenant_id).await?;
        self.store.children_of(id, tenant_id).await
    }

    /// Creates a new active entity, as a root or under an active parent of
    /// the same tenant.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        req: CreateEntityRequest,
    ) -> AppResult<EntityNode> {
        req.validate()
            .map_err(|e| AppError::validation(format!("Invalid entity: {e}")))?;
        let name = self.paths.validate_name(&req.name)?;

        let _guard = self.lock(tenant_id).await;

        let parent = match req.parent_id {
            Some(parent_id) => Some(self.resolve_parent(parent_id, tenant_id).await?),
            None => None,
        };

        let (path, level) = self.paths.derive(&name, parent.as_ref());
        self.check_depth(level)?;
        let claim = self.name_claim(&name, tenant_id, req.parent_id, None);
        self.ensure_name_available(claim.as_ref()).await?;

        let node = self
            .store
            .insert(
                NewEntityNode {
                    tenant_id,
                    name: name.clone(),
                    entity_type: req.entity_type,
                    parent_id: req.parent_id,
                    path,
                    level,
                    metadata: req.metadata,
                    created_by: ctx.actor_id,
                },
                claim.as_ref(),
            )
            .await?;

        info!(
            tenant_id = %tenant_id,
            entity_id = %node.id,
            entity_type = %node.entity_type,
            path = %node.path,
            "Entity created"
        );

        Ok(node)
    }

    /// Renames an entity and regenerates every active descendant's path in
    /// the same atomic commit. Renaming to the current name is a no-op.
    pub async fn rename(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
        new_name: &str,
    ) -> AppResult<EntityNode> {
        let name = self.paths.validate_name(new_name)?;

        let _guard = self.lock(tenant_id).await;

        let node = self.store.get_active(id, tenant_id).await?;
        if node.name == name {
            return Ok(node);
        }

        let claim = self.name_claim(&name, tenant_id, node.parent_id, Some(id));
        self.ensure_name_available(claim.as_ref()).await?;

        let parent = match node.parent_id {
            Some(parent_id) => Some(self.store.get_active(parent_id, tenant_id).await?),
            None => None,
        };
        let (path, level) = self.paths.derive(&name, parent.as_ref());
        let cascade = self.plan_cascade(&node, &path, level).await?;

        let change = StructuralChange {
            tenant_id,
            head: NodeUpdate {
                id,
                expected_version: node.version,
                changes: NodeChanges {
                    name: Some(name.clone()),
                    path: Some(path),
                    level: Some(level),
                    updated_by: ctx.actor_id,
                    ..NodeChanges::default()
                },
            },
            cascade,
        };
        let rows = change.row_count();
        let renamed = self.store.commit(change, claim.as_ref()).await?;

        info!(
            tenant_id = %tenant_id,
            entity_id = %id,
            old_path = %node.path,
            new_path = %renamed.path,
            rows,
            "Entity renamed"
        );

        Ok(renamed)
    }

    /// Moves an entity under a new parent, or makes it a root when
    /// `new_parent_id` is `None`. Every active descendant keeps its
    /// relative depth and path suffix.
    pub async fn move_entity(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> AppResult<EntityNode> {
        let _guard = self.lock(tenant_id).await;

        let node = self.store.get_active(id, tenant_id).await?;

        let parent = match new_parent_id {
            Some(parent_id) => {
                if parent_id == id {
                    warn!(tenant_id = %tenant_id, entity_id = %id, "Rejected move under itself");
                    return Err(AppError::cycle_detected(
                        "Cannot move an entity under itself",
                    ));
                }
                let parent = self.resolve_parent(parent_id, tenant_id).await?;
                if self.cycles.would_cycle(id, parent_id, tenant_id).await? {
                    warn!(
                        tenant_id = %tenant_id,
                        entity_id = %id,
                        new_parent_id = %parent_id,
                        "Rejected move under a descendant"
                    );
                    return Err(AppError::cycle_detected(
                        "Cannot move an entity under one of its descendants",
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        if node.parent_id == new_parent_id {
            return Ok(node);
        }

        let (path, level) = self.paths.derive(&node.name, parent.as_ref());
        self.check_depth(level)?;
        let claim = self.name_claim(&node.name, tenant_id, new_parent_id, Some(id));
        self.ensure_name_available(claim.as_ref()).await?;

        let cascade = self.plan_cascade(&node, &path, level).await?;

        let change = StructuralChange {
            tenant_id,
            head: NodeUpdate {
                id,
                expected_version: node.version,
                changes: NodeChanges {
                    parent_id: Some(new_parent_id),
                    path: Some(path),
                    level: Some(level),
                    updated_by: ctx.actor_id,
                    ..NodeChanges::default()
                },
            },
            cascade,
        };
        let rows = change.row_count();
        let moved = self.store.commit(change, claim.as_ref()).await?;

        info!(
            tenant_id = %tenant_id,
            entity_id = %id,
            old_path = %node.path,
            new_path = %moved.path,
            rows,
            "Entity moved"
        );

        Ok(moved)
    }

    /// Soft-deletes an entity that has no active children and no active
    /// dependents. Inactive entities are permanent tombstones.
    pub async fn remove(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
    ) -> AppResult<EntityNode> {
        let _guard = self.lock(tenant_id).await;

        let node = self.store.get_active(id, tenant_id).await?;

        let children = self.store.count_active_children(id, tenant_id).await?;
        if children > 0 {
            return Err(AppError::dependents_exist(format!(
                "Entity '{}' still has {children} active child entities",
                node.path
            )));
        }

        let dependents = self
            .dependents
            .count_active_dependents(id, tenant_id)
            .await?;
        if dependents > 0 {
            return Err(AppError::dependents_exist(format!(
                "Entity '{}' still has {dependents} active dependents",
                node.path
            )));
        }

        if !node.state.can_transition_to(NodeState::Inactive) {
            return Err(AppError::internal(format!(
                "Entity {id} cannot be deactivated from state {}",
                node.state.as_str()
            )));
        }

        let removed = self
            .store
            .update_fields(
                tenant_id,
                NodeUpdate {
                    id,
                    expected_version: node.version,
                    changes: NodeChanges {
                        state: Some(NodeState::Inactive),
                        updated_by: ctx.actor_id,
                        ..NodeChanges::default()
                    },
                },
            )
            .await?;

        info!(
            tenant_id = %tenant_id,
            entity_id = %id,
            path = %removed.path,
            "Entity removed"
        );

        Ok(removed)
    }

    /// Streams a tenant's active entities in hierarchy (pre-)order, limited
    /// to `level <= max_depth` when given.
    pub fn find_hierarchy(
        &self,
        tenant_id: Uuid,
        max_depth: Option<i32>,
    ) -> AppResult<BoxStream<'_, AppResult<EntityNode>>> {
        if let Some(depth) = max_depth {
            if depth < 0 {
                return Err(AppError::validation("max_depth must not be negative"));
            }
        }

        Ok(self
            .store
            .list_under_tenant(tenant_id)
            .try_filter(move |node| {
                futures::future::ready(max_depth.is_none_or(|depth| node.level <= depth))
            })
            .boxed())
    }

    /// Counts active entities per type along with level figures.
    pub async fn stats(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> AppResult<HierarchyStats> {
        let mut level_sums: BTreeMap<EntityType, i64> = BTreeMap::new();
        let mut stats = HierarchyStats::default();

        let mut nodes = self.store.list_under_tenant(tenant_id);
        while let Some(node) = nodes.try_next().await? {
            stats.total += 1;
            *stats.count_by_type.entry(node.entity_type).or_default() += 1;
            *level_sums.entry(node.entity_type).or_default() += i64::from(node.level);
            stats.max_level = stats.max_level.max(Some(node.level));
        }

        stats.average_level_by_type = level_sums
            .into_iter()
            .map(|(kind, sum)| {
                let count = stats.count_by_type.get(&kind).copied().unwrap_or(1);
                (kind, sum as f64 / count as f64)
            })
            .collect();

        Ok(stats)
    }

    /// Load a prospective parent, telling a parent in another tenant apart
    /// from one that does not exist.
    async fn resolve_parent(&self, parent_id: Uuid, tenant_id: Uuid) -> AppResult<EntityNode> {
        match self.store.get_active(parent_id, tenant_id).await {
            Ok(parent) => Ok(parent),
            Err(e) if e.is(ErrorKind::NotFound) => match self.store.locate(parent_id).await? {
                Some(owner) if owner != tenant_id => {
                    warn!(
                        tenant_id = %tenant_id,
                        parent_id = %parent_id,
                        "Rejected cross-tenant parent"
                    );
                    Err(AppError::cross_tenant(format!(
                        "Parent entity {parent_id} belongs to another tenant"
                    )))
                }
                _ => Err(AppError::not_found(format!(
                    "Parent entity {parent_id} not found"
                ))),
            },
            Err(e) => Err(e),
        }
    }

    fn check_depth(&self, level: i32) -> AppResult<()> {
        if level > self.config.max_depth {
            return Err(AppError::validation(format!(
                "Level {level} exceeds the maximum depth of {}",
                self.config.max_depth
            )));
        }
        Ok(())
    }

    /// Wait for the mutation lock covering `tenant_id`.
    async fn lock(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        match self.config.name_uniqueness {
            NameUniqueness::Global => self.locks.acquire_global().await,
            _ => self.locks.acquire(tenant_id).await,
        }
    }

    /// The name lookup for the configured uniqueness policy, if any.
    fn name_claim<'a>(
        &self,
        name: &'a str,
        tenant_id: Uuid,
        parent_id: Option<Uuid>,
        exclude_id: Option<Uuid>,
    ) -> Option<NameQuery<'a>> {
        let scope = match self.config.name_uniqueness {
            NameUniqueness::Global => NameScope::Global,
            NameUniqueness::Tenant => NameScope::Tenant(tenant_id),
            NameUniqueness::Siblings => NameScope::Siblings {
                tenant_id,
                parent_id,
            },
            NameUniqueness::None => return None,
        };
        Some(NameQuery {
            name,
            scope,
            exclude_id,
        })
    }

    /// Reject a name that clashes under the configured uniqueness policy
    /// before any cascade is planned. The store repeats the check
    /// atomically with the write.
    async fn ensure_name_available(&self, claim: Option<&NameQuery<'_>>) -> AppResult<()> {
        let Some(query) = claim else {
            return Ok(());
        };
        if self.store.name_in_use(query).await? {
            return Err(AppError::conflict(format!(
                "An active entity named '{}' already exists ({} scope)",
                query.name, self.config.name_uniqueness
            )));
        }
        Ok(())
    }

    /// Re-derive every active descendant of `head` from the head's new path
    /// and level, parents before children. Rows whose values do not change
    /// are left out. Fails before anything is written if a descendant would
    /// exceed the depth limit.
    async fn plan_cascade(
        &self,
        head: &EntityNode,
        head_path: &str,
        head_level: i32,
    ) -> AppResult<Vec<PathUpdate>> {
        let mut derived: HashMap<Uuid, (String, i32)> = HashMap::new();
        derived.insert(head.id, (head_path.to_string(), head_level));

        let mut cascade = Vec::new();
        let mut descendants = self.walker.descendants_of(head.id, head.tenant_id);
        while let Some(node) = descendants.try_next().await? {
            let Some((parent_path, parent_level)) =
                node.parent_id.and_then(|p| derived.get(&p)).cloned()
            else {
                return Err(AppError::internal(format!(
                    "Descendant {} was reached before its parent",
                    node.id
                )));
            };

            let (path, level) = self.paths.child_of(&parent_path, parent_level, &node.name);
            self.check_depth(level)?;

            if path != node.path || level != node.level {
                cascade.push(PathUpdate {
                    id: node.id,
                    expected_version: node.version,
                    path: path.clone(),
                    level,
                });
            }
            derived.insert(node.id, (path, level));
        }

        debug!(
            entity_id = %head.id,
            descendants = derived.len() - 1,
            rewrites = cascade.len(),
            "Cascade planned"
        );

        Ok(cascade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgtree_database::{MemoryTreeStore, StaticDependents};

    fn service() -> HierarchyService {
        HierarchyService::new(
            Arc::new(MemoryTreeStore::new(&HierarchyConfig::default())),
            Arc::new(StaticDependents::new()),
            HierarchyConfig::default(),
        )
    }

    #[test]
    fn test_create_request_rejects_non_object_metadata() {
        let mut req = CreateEntityRequest::new("Acme", EntityType::Company, None);
        assert!(req.validate().is_ok());

        req.metadata = serde_json::json!(["not", "an", "object"]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_deserializes_type_field() {
        let req: CreateEntityRequest =
            serde_json::from_str(r#"{"name": "Acme", "type": "company"}"#).unwrap();
        assert_eq!(req.entity_type, EntityType::Company);
        assert!(req.metadata.is_object());
    }

    #[tokio::test]
    async fn test_rename_to_same_name_is_noop() {
        let svc = service();
        let ctx = RequestContext::system();
        let tenant = Uuid::new_v4();
        let req = CreateEntityRequest::new("Acme", EntityType::Company, None);
        let acme = svc.create(&ctx, tenant, req).await.unwrap();

        let same = svc.rename(&ctx, tenant, acme.id, " Acme ").await.unwrap();
        assert_eq!(same.version, acme.version);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "path separator")]
    fn test_separator_mismatch_is_caught() {
        HierarchyService::new(
            Arc::new(MemoryTreeStore::new(&HierarchyConfig::default())),
            Arc::new(StaticDependents::new()),
            HierarchyConfig {
                path_separator: " / ".to_string(),
                ..HierarchyConfig::default()
            },
        );
    }

    #[tokio::test]
    async fn test_find_hierarchy_rejects_negative_depth() {
        let svc = service();
        let err = svc.find_hierarchy(Uuid::new_v4(), Some(-1)).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_create_rejects_depth_beyond_limit() {
        let svc = HierarchyService::new(
            Arc::new(MemoryTreeStore::new(&HierarchyConfig::default())),
            Arc::new(StaticDependents::new()),
            HierarchyConfig {
                max_depth: 1,
                ..HierarchyConfig::default()
            },
        );
        let ctx = RequestContext::system();
        let tenant = Uuid::new_v4();
        let a = CreateEntityRequest::new("A", EntityType::Company, None);
        let a = svc.create(&ctx, tenant, a).await.unwrap();
        let b = CreateEntityRequest::new("B", EntityType::Department, Some(a.id));
        let b = svc.create(&ctx, tenant, b).await.unwrap();

        let c = CreateEntityRequest::new("C", EntityType::Department, Some(b.id));
        let err = svc.create(&ctx, tenant, c).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
