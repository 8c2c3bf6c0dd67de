//! Dependent counts from the `users` table.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use orgtree_core::error::{AppError, ErrorKind};
use orgtree_core::result::AppResult;

use super::DependentCounter;

/// Counts active users assigned to an entity.
#[derive(Debug, Clone)]
pub struct UserDependents {
    pool: PgPool,
}

impl UserDependents {
    /// Create a new counter over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependentCounter for UserDependents {
    async fn count_active_dependents(&self, entity_id: Uuid, tenant_id: Uuid) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE entity_id = $1 AND tenant_id = $2 AND is_active",
        )
        .bind(entity_id)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count dependents", e))?;
        Ok(count as u64)
    }
}
