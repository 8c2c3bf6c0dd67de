//! Listing filters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::EntityType;
use super::model::EntityNode;

/// Filters for listing active entities within one tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Only entities of this type.
    pub entity_type: Option<EntityType>,
    /// Only direct children of this entity.
    pub parent_id: Option<Uuid>,
    /// Only root entities. Ignored when `parent_id` is set.
    #[serde(default)]
    pub roots_only: bool,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    /// Only entities at or above this level.
    pub max_level: Option<i32>,
}

impl EntityFilter {
    /// Check a node against the filter. Callers handle tenant and state.
    pub fn matches(&self, node: &EntityNode) -> bool {
        if let Some(entity_type) = self.entity_type {
            if node.entity_type != entity_type {
                return false;
            }
        }
        match self.parent_id {
            Some(parent_id) if node.parent_id != Some(parent_id) => return false,
            None if self.roots_only && node.parent_id.is_some() => return false,
            _ => {}
        }
        if let Some(needle) = &self.name_contains {
            if !node.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(max_level) = self.max_level {
            if node.level > max_level {
                return false;
            }
        }
        true
    }
}
