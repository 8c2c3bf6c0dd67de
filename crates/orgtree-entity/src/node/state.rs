//! Node lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an entity node.
///
/// `Active -> Inactive` is the only transition; `Inactive` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entity_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Visible to traversal, listing, and parenting.
    Active,
    /// Soft-deleted tombstone.
    Inactive,
}

impl NodeState {
    /// Whether the node takes part in traversal and parenting.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: NodeState) -> bool {
        matches!((self, next), (Self::Active, Self::Inactive))
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_to_inactive() {
        assert!(NodeState::Active.can_transition_to(NodeState::Inactive));
        assert!(!NodeState::Inactive.can_transition_to(NodeState::Active));
        assert!(!NodeState::Active.can_transition_to(NodeState::Active));
        assert!(!NodeState::Inactive.can_transition_to(NodeState::Inactive));
    }
}
