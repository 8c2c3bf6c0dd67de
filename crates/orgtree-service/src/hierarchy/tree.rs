//! Read-only tree views: nested forest, breadcrumbs, and integrity checks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::TryStreamExt;
use uuid::Uuid;

use orgtree_core::result::AppResult;
use orgtree_entity::node::{EntityNode, EntityTreeNode, IntegrityIssue, IntegrityProblem};

use super::cycle::CycleGuard;
use super::path::PathBuilder;
use super::service::HierarchyService;
use crate::context::RequestContext;

/// Builds nested views and verifies stored paths. Takes no mutation lock.
#[derive(Debug, Clone)]
pub struct TreeService {
    /// Source of the path-ordered entity stream.
    hierarchy: Arc<HierarchyService>,
    /// Ancestor walks for breadcrumbs.
    cycles: CycleGuard,
    /// Path derivation for expected values.
    paths: PathBuilder,
}

impl TreeService {
    /// Creates a new tree service.
    pub fn new(hierarchy: Arc<HierarchyService>) -> Self {
        let paths = PathBuilder::new(hierarchy.config());
        let cycles = hierarchy.cycle_guard().clone();
        Self {
            hierarchy,
            cycles,
            paths,
        }
    }

    /// Builds the nested forest of a tenant, down to `max_depth` when given.
    pub async fn tree(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
        max_depth: Option<i32>,
    ) -> AppResult<Vec<EntityTreeNode>> {
        let mut roots: Vec<EntityTreeNode> = Vec::new();
        // Open ancestors of the next node, outermost first.
        let mut open: Vec<EntityTreeNode> = Vec::new();

        let mut nodes = self.hierarchy.find_hierarchy(tenant_id, max_depth)?;
        while let Some(node) = nodes.try_next().await? {
            while let Some(top) = open.last() {
                if Some(top.id) == node.parent_id {
                    break;
                }
                if let Some(done) = open.pop() {
                    attach(done, &mut open, &mut roots);
                }
            }
            open.push(EntityTreeNode {
                id: node.id,
                name: node.name,
                entity_type: node.entity_type,
                path: node.path,
                level: node.level,
                children: Vec::new(),
            });
        }
        while let Some(done) = open.pop() {
            attach(done, &mut open, &mut roots);
        }

        Ok(roots)
    }

    /// Gets the breadcrumb trail from the root down to the given entity.
    pub async fn ancestors(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
        id: Uuid,
    ) -> AppResult<Vec<EntityNode>> {
        let mut chain = self.cycles.ancestry(id, tenant_id).await?;
        chain.reverse();
        Ok(chain)
    }

    /// Checks every active entity of a tenant against the path, level,
    /// parent, and acyclicity rules. Returns the violations in path order.
    pub async fn verify(
        &self,
        _ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> AppResult<Vec<IntegrityIssue>> {
        let nodes: Vec<EntityNode> = self
            .hierarchy
            .find_hierarchy(tenant_id, None)?
            .try_collect()
            .await?;
        let by_id: HashMap<Uuid, &EntityNode> = nodes.iter().map(|n| (n.id, n)).collect();

        let mut issues = Vec::new();
        for node in &nodes {
            let Some(problem) = self.check(node, &by_id) else {
                continue;
            };
            issues.push(IntegrityIssue {
                entity_id: node.id,
                path: node.path.clone(),
                problem,
            });
        }
        Ok(issues)
    }

    /// First problem found with a single node, if any.
    fn check(
        &self,
        node: &EntityNode,
        by_id: &HashMap<Uuid, &EntityNode>,
    ) -> Option<IntegrityProblem> {
        if let Some(parent_id) = node.parent_id {
            if !by_id.contains_key(&parent_id) {
                return Some(IntegrityProblem::OrphanedParent { parent_id });
            }
        }

        // Names from the node up to its root.
        let mut names = vec![node.name.as_str()];
        let mut seen = HashSet::from([node.id]);
        let mut current = node.parent_id;
        while let Some(id) = current {
            if !seen.insert(id) {
                return Some(IntegrityProblem::Cycle);
            }
            // An orphan further up is reported on that ancestor.
            let ancestor = by_id.get(&id)?;
            names.push(ancestor.name.as_str());
            current = ancestor.parent_id;
        }

        let expected_level = names.len() as i32 - 1;
        let expected_path = names
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(self.paths.separator());

        if node.path != expected_path {
            return Some(IntegrityProblem::PathMismatch {
                expected: expected_path,
            });
        }
        if node.level != expected_level {
            return Some(IntegrityProblem::LevelMismatch {
                expected: expected_level,
            });
        }
        None
    }
}

/// Close a finished subtree into its parent, or into the roots.
fn attach(done: EntityTreeNode, open: &mut [EntityTreeNode], roots: &mut Vec<EntityTreeNode>) {
    match open.last_mut() {
        Some(parent) => parent.children.push(done),
        None => roots.push(done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgtree_core::config::HierarchyConfig;
    use orgtree_database::{MemoryTreeStore, StaticDependents, TreeStore};
    use orgtree_entity::node::EntityType;

    use crate::hierarchy::CreateEntityRequest;

    struct Fixture {
        store: Arc<MemoryTreeStore>,
        hierarchy: Arc<HierarchyService>,
        trees: TreeService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryTreeStore::new(&HierarchyConfig::default()));
        let dyn_store: Arc<dyn TreeStore> = store.clone();
        let hierarchy = Arc::new(HierarchyService::new(
            dyn_store,
            Arc::new(StaticDependents::new()),
            HierarchyConfig::default(),
        ));
        let trees = TreeService::new(Arc::clone(&hierarchy));
        Fixture {
            store,
            hierarchy,
            trees,
        }
    }

    async fn create(
        fx: &Fixture,
        tenant: Uuid,
        name: &str,
        parent: Option<&EntityNode>,
    ) -> EntityNode {
        let req = CreateEntityRequest::new(name, EntityType::Department, parent.map(|p| p.id));
        fx.hierarchy
            .create(&RequestContext::system(), tenant, req)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tree_nests_children() {
        let fx = fixture();
        let ctx = RequestContext::system();
        let tenant = Uuid::new_v4();
        let acme = create(&fx, tenant, "Acme", None).await;
        let sales = create(&fx, tenant, "Sales", Some(&acme)).await;
        create(&fx, tenant, "EMEA", Some(&sales)).await;
        create(&fx, tenant, "HR", Some(&acme)).await;
        create(&fx, tenant, "Globex", None).await;

        let forest = fx.trees.tree(&ctx, tenant, None).await.unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].name, "Acme");
        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(forest[0].children[1].name, "Sales");
        assert_eq!(forest[0].children[1].children[0].name, "EMEA");
        assert_eq!(forest[1].name, "Globex");

        let shallow = fx.trees.tree(&ctx, tenant, Some(0)).await.unwrap();
        assert!(shallow.iter().all(|root| root.children.is_empty()));
    }

    #[tokio::test]
    async fn test_ancestors_root_first() {
        let fx = fixture();
        let ctx = RequestContext::system();
        let tenant = Uuid::new_v4();
        let acme = create(&fx, tenant, "Acme", None).await;
        let sales = create(&fx, tenant, "Sales", Some(&acme)).await;
        let emea = create(&fx, tenant, "EMEA", Some(&sales)).await;

        let crumbs = fx.trees.ancestors(&ctx, tenant, emea.id).await.unwrap();
        let names: Vec<&str> = crumbs.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Sales", "EMEA"]);
    }

    #[tokio::test]
    async fn test_verify_reports_drift() {
        let fx = fixture();
        let ctx = RequestContext::system();
        let tenant = Uuid::new_v4();
        let acme = create(&fx, tenant, "Acme", None).await;
        let sales = create(&fx, tenant, "Sales", Some(&acme)).await;
        let emea = create(&fx, tenant, "EMEA", Some(&sales)).await;

        assert!(fx.trees.verify(&ctx, tenant).await.unwrap().is_empty());

        fx.store.force_path(sales.id, "Acme > Sales", 4).await;
        fx.store.force_path(emea.id, "Acme > Sales > Emea", 2).await;

        let issues = fx.trees.verify(&ctx, tenant).await.unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].entity_id, sales.id);
        assert_eq!(issues[0].problem, IntegrityProblem::LevelMismatch { expected: 1 });
        assert_eq!(issues[1].entity_id, emea.id);
        assert_eq!(
            issues[1].problem,
            IntegrityProblem::PathMismatch {
                expected: "Acme > Sales > EMEA".to_string()
            }
        );
    }
}
