//! Change descriptions applied by the tree store.
//!
//! Every change names the version it was computed from. Stores refuse to
//! apply a change whose version no longer matches, which is what keeps a
//! cascade all-or-nothing across concurrent writers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::EntityNode;
use super::state::NodeState;

/// Field-level changes for a single node. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeChanges {
    /// New name.
    pub name: Option<String>,
    /// New parent; `Some(None)` roots the node.
    pub parent_id: Option<Option<Uuid>>,
    /// New materialized path.
    pub path: Option<String>,
    /// New level.
    pub level: Option<i32>,
    /// Replacement metadata object.
    pub metadata: Option<serde_json::Value>,
    /// New lifecycle state.
    pub state: Option<NodeState>,
    /// Acting user.
    pub updated_by: Option<Uuid>,
}

impl NodeChanges {
    /// Apply the changes to an in-memory copy of a node.
    ///
    /// Does not touch `version` or `updated_at`; the store owns those.
    pub fn apply_to(&self, node: &mut EntityNode) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(parent_id) = self.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(path) = &self.path {
            node.path = path.clone();
        }
        if let Some(level) = self.level {
            node.level = level;
        }
        if let Some(metadata) = &self.metadata {
            node.metadata = metadata.clone();
        }
        if let Some(state) = self.state {
            node.state = state;
        }
        if self.updated_by.is_some() {
            node.updated_by = self.updated_by;
        }
    }
}

/// A versioned update of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    /// Target entity.
    pub id: Uuid,
    /// Version the changes were computed from.
    pub expected_version: i64,
    /// Fields to change.
    pub changes: NodeChanges,
}

/// A versioned path/level rewrite of one descendant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathUpdate {
    /// Target entity.
    pub id: Uuid,
    /// Version the new path was derived from.
    pub expected_version: i64,
    /// Re-derived materialized path.
    pub path: String,
    /// Re-derived level.
    pub level: i32,
}

/// A structural mutation: one head update plus the descendant cascade it
/// implies. Stores apply it atomically or not at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralChange {
    /// Tenant every touched row must belong to.
    pub tenant_id: Uuid,
    /// The node the caller asked to change.
    pub head: NodeUpdate,
    /// Path/level rewrites for the head's active descendants, pre-order.
    pub cascade: Vec<PathUpdate>,
}

impl StructuralChange {
    /// A change touching a single node.
    pub fn single(tenant_id: Uuid, head: NodeUpdate) -> Self {
        Self {
            tenant_id,
            head,
            cascade: Vec::new(),
        }
    }

    /// Number of rows the change writes.
    pub fn row_count(&self) -> usize {
        1 + self.cascade.len()
    }
}
