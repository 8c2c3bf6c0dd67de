//! Per-tenant mutation locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Serializes structural mutations within a tenant while letting
/// different tenants proceed concurrently.
///
/// The global lock is separate from every tenant lock. Callers pick one
/// mode per service and stay with it.
#[derive(Debug, Clone, Default)]
pub struct TenantLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    global: Arc<Mutex<()>>,
}

impl TenantLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a tenant's forest. Released on drop.
    pub async fn acquire(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(tenant_id).or_default().value());
        lock.lock_owned().await
    }

    /// Wait for exclusive access across all tenants.
    pub async fn acquire_global(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.global).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_tenant_is_exclusive() {
        let locks = TenantLocks::new();
        let tenant = Uuid::new_v4();

        let guard = locks.acquire(tenant).await;
        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(tenant)).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(20), locks.acquire(tenant)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_tenants_are_independent() {
        let locks = TenantLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let other = locks.acquire(Uuid::new_v4());
        let b = tokio::time::timeout(Duration::from_millis(20), other).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_global_lock_is_shared() {
        let locks = TenantLocks::new();
        let clone = locks.clone();

        let guard = locks.acquire_global().await;
        let second = tokio::time::timeout(Duration::from_millis(20), clone.acquire_global()).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(20), clone.acquire_global()).await;
        assert!(third.is_ok());
    }
}
