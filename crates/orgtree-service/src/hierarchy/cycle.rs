//! Ancestor-chain walks and cycle detection.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use orgtree_core::error::{AppError, ErrorKind};
use orgtree_core::result::AppResult;
use orgtree_database::TreeStore;
use orgtree_entity::node::EntityNode;

/// Decides whether a proposed parent assignment would make a node its own
/// ancestor.
///
/// Walks are bounded by `max_depth + 1` hops and by a visited set, so a
/// corrupt chain surfaces as an `Internal` error instead of a hang.
#[derive(Debug, Clone)]
pub struct CycleGuard {
    store: Arc<dyn TreeStore>,
    max_depth: i32,
}

impl CycleGuard {
    /// Creates a guard over the given store.
    pub fn new(store: Arc<dyn TreeStore>, max_depth: i32) -> Self {
        Self { store, max_depth }
    }

    /// Whether making `candidate_parent_id` the parent of `moving_id` would
    /// close a cycle.
    pub async fn would_cycle(
        &self,
        moving_id: Uuid,
        candidate_parent_id: Uuid,
        tenant_id: Uuid,
    ) -> AppResult<bool> {
        if moving_id == candidate_parent_id {
            return Ok(true);
        }
        let chain = self.ancestry(candidate_parent_id, tenant_id).await?;
        Ok(chain.iter().any(|node| node.id == moving_id))
    }

    /// The node followed by its ancestors, nearest first.
    pub async fn ancestry(&self, id: Uuid, tenant_id: Uuid) -> AppResult<Vec<EntityNode>> {
        let limit = self.max_depth as usize + 1;
        let mut chain: Vec<EntityNode> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            if !visited.insert(node_id) || chain.len() >= limit {
                error!(
                    tenant_id = %tenant_id,
                    entity_id = %id,
                    hops = chain.len(),
                    "Ancestor chain loops or exceeds the depth limit"
                );
                return Err(AppError::internal(format!(
                    "Ancestor chain of entity {id} is corrupt"
                )));
            }

            let node = match self.store.get_active(node_id, tenant_id).await {
                Ok(node) => node,
                Err(e) if e.is(ErrorKind::NotFound) && !chain.is_empty() => {
                    return Err(AppError::internal(format!(
                        "Ancestor {node_id} of entity {id} is missing"
                    )));
                }
                Err(e) => return Err(e),
            };
            current = node.parent_id;
            chain.push(node);
        }

        Ok(chain)
    }
}
