//! PostgreSQL tree store.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use orgtree_core::config::HierarchyConfig;
use orgtree_core::error::{AppError, ErrorKind};
use orgtree_core::result::AppResult;
use orgtree_core::types::{PageRequest, PageResponse};
use orgtree_entity::node::{
    EntityFilter, EntityNode, NewEntityNode, NodeUpdate, PathUpdate, StructuralChange,
};

use super::{NameQuery, NameScope, TreeStore};

/// Repository for entity rows in the `entities` table.
#[derive(Debug, Clone)]
pub struct PgTreeStore {
    pool: PgPool,
    separator: String,
    batch_size: usize,
}

impl PgTreeStore {
    /// Create a new store using the path separator and cascade batch size
    /// of `config`.
    pub fn new(pool: PgPool, config: &HierarchyConfig) -> Self {
        Self {
            pool,
            separator: config.path_separator.clone(),
            batch_size: config.cascade_batch_size.max(1),
        }
    }
}

/// Pre-order stream of a tenant's active entities. The recursive part
/// builds a `[name, id, name, id, ...]` key from the roots down; rows it
/// cannot reach sort last by path.
const PREORDER_SQL: &str = "\
WITH RECURSIVE walk AS ( \
    SELECT id, ARRAY[name COLLATE \"C\", id::text COLLATE \"C\"] AS sort_key \
    FROM entities \
    WHERE tenant_id = $1 AND state = 'active' AND parent_id IS NULL \
  UNION ALL \
    SELECT e.id, w.sort_key || ARRAY[e.name COLLATE \"C\", e.id::text COLLATE \"C\"] \
    FROM entities e JOIN walk w ON e.parent_id = w.id \
    WHERE e.tenant_id = $1 AND e.state = 'active' \
) \
SELECT e.* FROM entities e LEFT JOIN walk w ON w.id = e.id \
WHERE e.tenant_id = $1 AND e.state = 'active' \
ORDER BY w.sort_key IS NULL, w.sort_key, \
         string_to_array(e.path COLLATE \"C\", $2), e.id";

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the `WHERE` conditions shared by the count and page queries.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, tenant_id: Uuid, filter: &EntityFilter) {
    qb.push(" WHERE tenant_id = ")
        .push_bind(tenant_id)
        .push(" AND state = 'active'");

    if let Some(entity_type) = filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type);
    }
    match filter.parent_id {
        Some(parent_id) => {
            qb.push(" AND parent_id = ").push_bind(parent_id);
        }
        None if filter.roots_only => {
            qb.push(" AND parent_id IS NULL");
        }
        None => {}
    }
    if let Some(needle) = &filter.name_contains {
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(needle)));
    }
    if let Some(max_level) = filter.max_level {
        qb.push(" AND level <= ").push_bind(max_level);
    }
}

/// `EXISTS` query for an active entity matching `query`.
fn name_exists_query(query: &NameQuery<'_>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT EXISTS (SELECT 1 FROM entities WHERE state = 'active' AND name = ",
    );
    qb.push_bind(query.name.to_string());

    match query.scope {
        NameScope::Global => {}
        NameScope::Tenant(tenant_id) => {
            qb.push(" AND tenant_id = ").push_bind(tenant_id);
        }
        NameScope::Siblings {
            tenant_id,
            parent_id,
        } => {
            qb.push(" AND tenant_id = ").push_bind(tenant_id);
            match parent_id {
                Some(parent_id) => {
                    qb.push(" AND parent_id = ").push_bind(parent_id);
                }
                None => {
                    qb.push(" AND parent_id IS NULL");
                }
            }
        }
    }
    if let Some(exclude_id) = query.exclude_id {
        qb.push(" AND id <> ").push_bind(exclude_id);
    }
    qb.push(")");
    qb
}

/// Check a name inside a transaction. The transaction-scoped advisory lock
/// makes every claim on the same name wait until the holder commits or
/// rolls back, across processes.
async fn claim_name(conn: &mut PgConnection, query: &NameQuery<'_>) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(query.name)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock name", e))?;

    let mut exists = name_exists_query(query);
    let taken = exists
        .build_query_scalar::<bool>()
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check name", e))?;

    if taken {
        return Err(query.conflict());
    }
    Ok(())
}

/// Update the head row of a structural change inside a transaction.
async fn update_head(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    update: &NodeUpdate,
) -> AppResult<EntityNode> {
    let changes = &update.changes;
    let mut qb = QueryBuilder::<Postgres>::new(
        "UPDATE entities SET version = version + 1, updated_at = NOW()",
    );

    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(parent_id) = changes.parent_id {
        qb.push(", parent_id = ").push_bind(parent_id);
    }
    if let Some(path) = &changes.path {
        qb.push(", path = ").push_bind(path.clone());
    }
    if let Some(level) = changes.level {
        qb.push(", level = ").push_bind(level);
    }
    if let Some(metadata) = &changes.metadata {
        qb.push(", metadata = ").push_bind(metadata.clone());
    }
    if let Some(state) = changes.state {
        qb.push(", state = ").push_bind(state);
    }
    if let Some(updated_by) = changes.updated_by {
        qb.push(", updated_by = ").push_bind(updated_by);
    }

    qb.push(" WHERE id = ")
        .push_bind(update.id)
        .push(" AND tenant_id = ")
        .push_bind(tenant_id)
        .push(" AND version = ")
        .push_bind(update.expected_version)
        .push(" AND state = 'active' RETURNING *");

    let updated = qb
        .build_query_as::<EntityNode>()
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update entity", e))?;

    if let Some(node) = updated {
        return Ok(node);
    }

    let current: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM entities WHERE id = $1 AND tenant_id = $2 AND state = 'active'",
    )
    .bind(update.id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to read entity version", e))?;

    match current {
        Some(actual) => {
            warn!(
                entity_id = %update.id,
                expected_version = update.expected_version,
                actual_version = actual,
                "Stale entity version, rejecting change"
            );
            Err(AppError::conflict(format!(
                "Entity {} was modified concurrently",
                update.id
            )))
        }
        None => Err(AppError::not_found(format!("Entity {} not found", update.id))),
    }
}

/// Rewrite path and level for one chunk of descendants with a single
/// `UNNEST` statement. Fails if any row's version has moved on.
async fn update_cascade_chunk(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    chunk: &[PathUpdate],
) -> AppResult<()> {
    let ids: Vec<Uuid> = chunk.iter().map(|u| u.id).collect();
    let versions: Vec<i64> = chunk.iter().map(|u| u.expected_version).collect();
    let paths: Vec<String> = chunk.iter().map(|u| u.path.clone()).collect();
    let levels: Vec<i32> = chunk.iter().map(|u| u.level).collect();

    let result = sqlx::query(
        "UPDATE entities AS e \
         SET path = v.path, level = v.level, version = e.version + 1, updated_at = NOW() \
         FROM UNNEST($1::uuid[], $2::bigint[], $3::text[], $4::int[]) \
              AS v(id, expected_version, path, level) \
         WHERE e.id = v.id AND e.tenant_id = $5 \
           AND e.version = v.expected_version AND e.state = 'active'",
    )
    .bind(ids)
    .bind(versions)
    .bind(paths)
    .bind(levels)
    .bind(tenant_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to cascade paths", e))?;

    if result.rows_affected() != chunk.len() as u64 {
        warn!(
            tenant_id = %tenant_id,
            expected = chunk.len(),
            updated = result.rows_affected(),
            "Descendant changed during cascade, rolling back"
        );
        return Err(AppError::conflict(
            "A descendant was modified concurrently; no changes were applied",
        ));
    }
    Ok(())
}

#[async_trait]
impl TreeStore for PgTreeStore {
    fn separator(&self) -> &str {
        &self.separator
    }

    async fn get_active(&self, id: Uuid, tenant_id: Uuid) -> AppResult<EntityNode> {
        sqlx::query_as::<_, EntityNode>(
            "SELECT * FROM entities WHERE id = $1 AND tenant_id = $2 AND state = 'active'",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find entity", e))?
        .ok_or_else(|| AppError::not_found(format!("Entity {id} not found")))
    }

    async fn locate(&self, id: Uuid) -> AppResult<Option<Uuid>> {
        sqlx::query_scalar("SELECT tenant_id FROM entities WHERE id = $1 AND state = 'active'")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to locate entity", e))
    }

    async fn children_of(&self, id: Uuid, tenant_id: Uuid) -> AppResult<Vec<EntityNode>> {
        sqlx::query_as::<_, EntityNode>(
            "SELECT * FROM entities \
             WHERE parent_id = $1 AND tenant_id = $2 AND state = 'active' \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    async fn count_active_children(&self, id: Uuid, tenant_id: Uuid) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities \
             WHERE parent_id = $1 AND tenant_id = $2 AND state = 'active'",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count children", e))?;
        Ok(count as u64)
    }

    fn list_under_tenant(&self, tenant_id: Uuid) -> BoxStream<'_, AppResult<EntityNode>> {
        sqlx::query_as::<_, EntityNode>(PREORDER_SQL)
            .bind(tenant_id)
            .bind(self.separator.clone())
            .fetch(&self.pool)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to stream entities", e))
            .boxed()
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &EntityFilter,
        page: &PageRequest,
    ) -> AppResult<PageResponse<EntityNode>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM entities");
        push_filter(&mut count_qb, tenant_id, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to count entities", e)
            })?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM entities");
        push_filter(&mut qb, tenant_id, filter);
        qb.push(" ORDER BY string_to_array(path COLLATE \"C\", ")
            .push_bind(self.separator.clone())
            .push(") ASC, id ASC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let items = qb
            .build_query_as::<EntityNode>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list entities", e))?;

        Ok(PageResponse::new(items, page, total as u64))
    }

    async fn name_in_use(&self, query: &NameQuery<'_>) -> AppResult<bool> {
        let mut exists = name_exists_query(query);
        exists
            .build_query_scalar::<bool>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check name", e))
    }

    async fn insert(
        &self,
        node: NewEntityNode,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        if let Some(query) = claim {
            claim_name(&mut tx, query).await?;
        }

        let created = sqlx::query_as::<_, EntityNode>(
            "INSERT INTO entities \
             (id, tenant_id, name, entity_type, parent_id, path, level, metadata, \
              state, version, created_by, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', 1, $9, $9) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(node.tenant_id)
        .bind(&node.name)
        .bind(node.entity_type)
        .bind(node.parent_id)
        .bind(&node.path)
        .bind(node.level)
        .bind(&node.metadata)
        .bind(node.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::not_found("Parent entity not found")
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create entity", e),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })?;
        Ok(created)
    }

    async fn commit(
        &self,
        change: StructuralChange,
        claim: Option<&NameQuery<'_>>,
    ) -> AppResult<EntityNode> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        if let Some(query) = claim {
            claim_name(&mut tx, query).await?;
        }

        let head = update_head(&mut tx, change.tenant_id, &change.head).await?;

        for chunk in change.cascade.chunks(self.batch_size) {
            update_cascade_chunk(&mut tx, change.tenant_id, chunk).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })?;

        debug!(
            entity_id = %head.id,
            rows = change.row_count(),
            "Structural change committed"
        );
        Ok(head)
    }
}
