//! Entity hierarchy management and tree views.

pub mod cycle;
pub mod lock;
pub mod path;
pub mod service;
pub mod tree;
pub mod walker;

pub use cycle::CycleGuard;
pub use lock::TenantLocks;
pub use path::PathBuilder;
pub use service::{CreateEntityRequest, HierarchyService};
pub use tree::TreeService;
pub use walker::DescendantWalker;
