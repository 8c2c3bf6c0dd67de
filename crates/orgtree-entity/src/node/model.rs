//! Entity node model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::kind::EntityType;
use super::state::NodeState;

/// A node in a tenant's organizational forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EntityNode {
    /// Unique entity identifier.
    pub id: Uuid,
    /// Owning tenant. Never changes after creation.
    pub tenant_id: Uuid,
    /// Display name; the last segment of `path`.
    pub name: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Parent entity (None for roots).
    pub parent_id: Option<Uuid>,
    /// Materialized path, e.g. `Acme > Sales`.
    pub path: String,
    /// Depth in the forest (0 for roots).
    pub level: i32,
    /// Opaque key/value metadata (always a JSON object).
    pub metadata: serde_json::Value,
    /// Lifecycle state.
    pub state: NodeState,
    /// Optimistic concurrency stamp, bumped by every write.
    pub version: i64,
    /// Who created the entity.
    pub created_by: Option<Uuid>,
    /// Who last changed the entity.
    pub updated_by: Option<Uuid>,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated.
    pub updated_at: DateTime<Utc>,
}

impl EntityNode {
    /// Check if this is a root entity (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether the entity is active.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Data required to insert a new entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntityNode {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Entity name.
    pub name: String,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Parent entity (None for roots).
    pub parent_id: Option<Uuid>,
    /// Materialized path derived from the parent.
    pub path: String,
    /// Level derived from the parent.
    pub level: i32,
    /// Metadata object.
    pub metadata: serde_json::Value,
    /// Creating user.
    pub created_by: Option<Uuid>,
}

impl NewEntityNode {
    /// Materialize the record as a freshly created active node.
    pub fn into_node(self, id: Uuid, now: DateTime<Utc>) -> EntityNode {
        EntityNode {
            id,
            tenant_id: self.tenant_id,
            name: self.name,
            entity_type: self.entity_type,
            parent_id: self.parent_id,
            path: self.path,
            level: self.level,
            metadata: self.metadata,
            state: NodeState::Active,
            version: 1,
            created_by: self.created_by,
            updated_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
