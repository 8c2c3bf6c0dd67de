//! Entity node domain types.

pub mod change;
pub mod filter;
pub mod kind;
pub mod model;
pub mod state;
pub mod tree;

pub use change::{NodeChanges, NodeUpdate, PathUpdate, StructuralChange};
pub use filter::EntityFilter;
pub use kind::EntityType;
pub use model::{EntityNode, NewEntityNode};
pub use state::NodeState;
pub use tree::{EntityTreeNode, HierarchyStats, IntegrityIssue, IntegrityProblem};
