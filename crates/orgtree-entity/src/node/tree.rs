//! Read-side views over a tenant's forest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::EntityType;

/// A node in a nested tree view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTreeNode {
    /// Entity ID.
    pub id: Uuid,
    /// Entity name.
    pub name: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Full path.
    pub path: String,
    /// Depth level.
    pub level: i32,
    /// Child nodes, in path order.
    pub children: Vec<EntityTreeNode>,
}

/// Aggregate figures for one tenant's active entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyStats {
    /// Number of active entities.
    pub total: u64,
    /// Active entities per type.
    pub count_by_type: BTreeMap<EntityType, u64>,
    /// Mean level per type.
    pub average_level_by_type: BTreeMap<EntityType, f64>,
    /// Deepest level in use (None when the tenant is empty).
    pub max_level: Option<i32>,
}

/// What is wrong with a node found by an integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum IntegrityProblem {
    /// The parent is missing, inactive, or in another tenant.
    OrphanedParent {
        /// The dangling parent reference.
        parent_id: Uuid,
    },
    /// The stored path differs from the one derived from the ancestors.
    PathMismatch {
        /// Expected path.
        expected: String,
    },
    /// The stored level differs from the ancestor count.
    LevelMismatch {
        /// Expected level.
        expected: i32,
    },
    /// The node is its own ancestor.
    Cycle,
}

/// One integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// Affected entity.
    pub entity_id: Uuid,
    /// Stored path of the affected entity.
    pub path: String,
    /// The violation.
    #[serde(flatten)]
    pub problem: IntegrityProblem,
}
