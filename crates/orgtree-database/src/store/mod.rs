//! Persistence-agnostic access to entity-node records.
//!
//! Every read is scoped by tenant: asking for an id that lives in another
//! tenant fails with `NotFound` exactly like asking for an id that does not
//! exist. Only [`TreeStore::locate`] reveals which tenant owns an id, and it
//! reveals nothing else.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use orgtree_core::error::AppError;
use orgtree_core::result::AppResult;
use orgtree_core::types::{PageRequest, PageResponse};
use orgtree_entity::node::{EntityFilter, EntityNode, NewEntityNode, NodeUpdate, StructuralChange};

pub use memory::MemoryTreeStore;
pub use postgres::PgTreeStore;

/// Where a name must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Across every tenant.
    Global,
    /// Within one tenant.
    Tenant(Uuid),
    /// Among the children of one parent (or the roots) of one tenant.
    Siblings {
        /// Tenant of the siblings.
        tenant_id: Uuid,
        /// Shared parent; `None` means the tenant's roots.
        parent_id: Option<Uuid>,
    },
}

/// A lookup for an active entity carrying a given name.
#[derive(Debug, Clone, Copy)]
pub struct NameQuery<'a> {
    /// Exact name to look for.
    pub name: &'a str,
    /// Scope of the search.
    pub scope: NameScope,
    /// Entity to ignore (the one being renamed or moved).
    pub exclude_id: Option<Uuid>,
}

impl NameQuery<'_> {
    /// Check a node against the lookup. Callers handle the active state.
    pub fn matches(&self, node: &EntityNode) -> bool {
        if node.name != self.name || Some(node.id) == self.exclude_id {
            return false;
        }
        match self.scope {
            NameScope::Global => true,
            NameScope::Tenant(tenant_id) => node.tenant_id == tenant_id,
            NameScope::Siblings {
                tenant_id,
                parent_id,
            } => node.tenant_id == tenant_id && node.parent_id == parent_id,
        }
    }

    /// The error reported when the name is already taken.
    pub fn conflict(&self) -> AppError {
        AppError::conflict(format!(
            "An active entity named '{}' already exists",
            self.name
        ))
    }
}

/// Storage contract for the entity forest.
///
/// Implementations must be thread-safe. [`TreeStore::commit`] must be
/// all-or-nothing: either every row in the change is written, or none is.
#[async_trait]
pub trait TreeStore: Send + Sync + fmt::Debug {
    /// Separator the stored paths are split on.
    fn separator(&self) -> &str;

    /// Fetch an active entity inside a tenant.
    async fn get_active(&self, id: Uuid, tenant_id: Uuid) -> AppResult<EntityNode>;

    /// Tenant owning an active entity, if any.
    async fn locate(&self, id: Uuid) -> AppResult<Option<Uuid>>;

    /// Active direct children, in stored order (creation time, then id).
    async fn children_of(&self, id: Uuid, tenant_id: Uuid) -> AppResult<Vec<EntityNode>>;

    /// Number of active direct children.
    async fn count_active_children(&self, id: Uuid, tenant_id: Uuid) -> AppResult<u64>;

    /// Lazily stream every active entity of a tenant in pre-order: a
    /// depth-first walk from the roots with siblings ordered by name, then
    /// id. Entities sharing a path keep their subtrees apart. Entities no
    /// root reaches follow at the end in path order.
    fn list_under_tenant(&self, tenant_id: Uuid) -> BoxStream<'_, AppResult<EntityNode>>;

    /// Filtered, paginated listing of active entities.
    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &EntityFilter,
        page: &PageRequest,
    ) -> AppResult<PageResponse<EntityNode>>;

    /// Whether an active entity matches the name lookup.
    async fn name_in_use(&self, query: &NameQuery<'_>) -> AppResult<bool>;

    /// Insert a new active entity. When `claim` is given, the name check
    /// and the insert are atomic against every other claim of the store.
    async fn insert(
        &self,
        node: NewEntityNode,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode>;

    /// Apply a versioned update to one entity.
    async fn update_fields(&self, tenant_id: Uuid, update: NodeUpdate) -> AppResult<EntityNode> {
        self.commit(StructuralChange::single(tenant_id, update), None)
            .await
    }

    /// Atomically apply a head update and its cascade. Returns the updated
    /// head. Fails with `NotFound` when the head is gone and `Conflict` when
    /// any row's version no longer matches or `claim` is already taken.
    async fn commit(
        &self,
        change: StructuralChange,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orgtree_entity::node::EntityType;

    fn node(tenant_id: Uuid, parent_id: Option<Uuid>, name: &str) -> EntityNode {
        NewEntityNode {
            tenant_id,
            name: name.to_string(),
            entity_type: EntityType::Department,
            parent_id,
            path: name.to_string(),
            level: 0,
            metadata: serde_json::json!({}),
            created_by: None,
        }
        .into_node(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_name_query_scopes() {
        let tenant = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let sales = node(tenant, Some(parent), "Sales");

        let global = NameQuery {
            name: "Sales",
            scope: NameScope::Global,
            exclude_id: None,
        };
        assert!(global.matches(&sales));

        let other_tenant = NameQuery {
            scope: NameScope::Tenant(Uuid::new_v4()),
            ..global
        };
        assert!(!other_tenant.matches(&sales));

        let roots = NameQuery {
            scope: NameScope::Siblings {
                tenant_id: tenant,
                parent_id: None,
            },
            ..global
        };
        assert!(!roots.matches(&sales));

        let excluded = NameQuery {
            exclude_id: Some(sales.id),
            ..global
        };
        assert!(!excluded.matches(&sales));
    }
}
