//! The dependent collaborator consulted before an entity is removed.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use orgtree_core::result::AppResult;

pub use memory::StaticDependents;
pub use postgres::UserDependents;

/// Counts records outside the tree that still point at an entity.
#[async_trait]
pub trait DependentCounter: Send + Sync + fmt::Debug {
    /// Number of active dependents attached to `entity_id` in `tenant_id`.
    async fn count_active_dependents(&self, entity_id: Uuid, tenant_id: Uuid) -> AppResult<u64>;
}
