//! In-memory dependent counts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use orgtree_core::result::AppResult;

use super::DependentCounter;

/// Dependent counts held in a concurrent map, keyed by tenant and entity.
///
/// Used by tests and by embedders that track dependents themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticDependents {
    counts: Arc<DashMap<(Uuid, Uuid), u64>>,
}

impl StaticDependents {
    /// Creates a counter that reports zero for every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of active dependents of an entity.
    pub fn set(&self, tenant_id: Uuid, entity_id: Uuid, count: u64) {
        if count == 0 {
            self.counts.remove(&(tenant_id, entity_id));
        } else {
            self.counts.insert((tenant_id, entity_id), count);
        }
    }
}

#[async_trait]
impl DependentCounter for StaticDependents {
    async fn count_active_dependents(&self, entity_id: Uuid, tenant_id: Uuid) -> AppResult<u64> {
        Ok(self
            .counts
            .get(&(tenant_id, entity_id))
            .map(|c| *c)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_are_tenant_scoped() {
        let deps = StaticDependents::new();
        let tenant = Uuid::new_v4();
        let entity = Uuid::new_v4();

        deps.set(tenant, entity, 2);
        assert_eq!(deps.count_active_dependents(entity, tenant).await.unwrap(), 2);
        assert_eq!(
            deps.count_active_dependents(entity, Uuid::new_v4())
                .await
                .unwrap(),
            0
        );

        deps.set(tenant, entity, 0);
        assert_eq!(deps.count_active_dependents(entity, tenant).await.unwrap(), 0);
    }
}
