//! Lazy pre-order traversal of a node's active descendants.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use orgtree_core::result::AppResult;
use orgtree_database::TreeStore;
use orgtree_entity::node::EntityNode;

/// Produces a node's active descendants, parents before children and
/// siblings in stored order.
///
/// The traversal keeps an explicit stack instead of recursing and tracks
/// every id it has queued, so a corrupt parent link can never make it loop.
#[derive(Debug, Clone)]
pub struct DescendantWalker {
    store: Arc<dyn TreeStore>,
}

/// Traversal state threaded through the stream.
struct Frontier {
    /// Node whose children have not been fetched yet.
    start: Option<Uuid>,
    /// Nodes still to be yielded, next on top.
    stack: Vec<EntityNode>,
    /// Ids already queued (including the start node).
    seen: HashSet<Uuid>,
}

impl Frontier {
    fn push_children(&mut self, children: Vec<EntityNode>) {
        for child in children.into_iter().rev() {
            if self.seen.insert(child.id) {
                self.stack.push(child);
            }
        }
    }
}

impl DescendantWalker {
    /// Creates a walker over the given store.
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Stream the active descendants of `id`, excluding `id` itself.
    ///
    /// Children are fetched one node at a time as the stream is polled.
    /// Every call starts a fresh traversal.
    pub fn descendants_of(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> BoxStream<'static, AppResult<EntityNode>> {
        let store = Arc::clone(&self.store);
        let frontier = Frontier {
            start: Some(id),
            stack: Vec::new(),
            seen: HashSet::from([id]),
        };

        stream::try_unfold(frontier, move |frontier| {
            advance(Arc::clone(&store), tenant_id, frontier)
        })
        .boxed()
    }
}

/// Yield the next node of the traversal, queueing its children.
async fn advance(
    store: Arc<dyn TreeStore>,
    tenant_id: Uuid,
    mut frontier: Frontier,
) -> AppResult<Option<(EntityNode, Frontier)>> {
    if let Some(start) = frontier.start.take() {
        let children = store.children_of(start, tenant_id).await?;
        frontier.push_children(children);
    }

    let Some(node) = frontier.stack.pop() else {
        return Ok(None);
    };
    let children = store.children_of(node.id, tenant_id).await?;
    frontier.push_children(children);
    Ok(Some((node, frontier)))
}
