//! # orgtree-service
//!
//! Hierarchy service layer for OrgTree. [`HierarchyService`] is the single
//! entry point for structural mutations; [`TreeService`] serves read-only
//! views. Both are built over a [`orgtree_database::TreeStore`] and receive
//! their collaborators as `Arc` references at construction time.

pub mod context;
pub mod hierarchy;

pub use context::RequestContext;
pub use hierarchy::{
    CreateEntityRequest, CycleGuard, DescendantWalker, HierarchyService, PathBuilder, TenantLocks,
    TreeService,
};
