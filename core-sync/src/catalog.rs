//! # Work Item Catalog
//!
//! Persistence for work items, keyed by `(job_id, object_key)`.
//!
//! Writes are staged in a [`CatalogBatch`] and committed together: the
//! resolver commits once per listing page, and the orchestrator commits the
//! final item states once per page. The only write outside a batch is
//! [`CatalogRepository::update_checkpoint`], which the fetch executor calls
//! after every chunk so a crash never loses more than the chunk in flight.

use crate::job::JobId;
use crate::work_item::{WorkItem, WorkItemStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Rows staged for one atomic commit
///
/// Upserting the same object key twice keeps only the latest state.
#[derive(Debug, Default, Clone)]
pub struct CatalogBatch {
    items: Vec<WorkItem>,
    index: HashMap<String, usize>,
}

impl CatalogBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert-or-update for `item`.
    pub fn upsert(&mut self, item: WorkItem) {
        match self.index.get(&item.object_key) {
            Some(&position) => self.items[position] = item,
            None => {
                self.index.insert(item.object_key.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Read up to `limit` rows of a job starting at `offset`, in insertion order.
    async fn batch_scan(&self, job_id: &JobId, offset: u64, limit: u32) -> Result<Vec<WorkItem>>;

    /// Persist every staged row in one transaction.
    ///
    /// Returns the committed rows, in staging order, with database ids set.
    async fn commit(&self, batch: CatalogBatch) -> Result<Vec<WorkItem>>;

    /// Durably record a new checkpoint for one object.
    async fn update_checkpoint(
        &self,
        job_id: &JobId,
        object_key: &str,
        last_position: u64,
        now: i64,
    ) -> Result<()>;

    async fn find_by_key(&self, job_id: &JobId, object_key: &str) -> Result<Option<WorkItem>>;

    /// Rows of a job whose keys are in `object_keys`, in no particular order.
    /// Keys without a row are absent from the result.
    async fn find_by_keys(&self, job_id: &JobId, object_keys: &[&str]) -> Result<Vec<WorkItem>>;

    /// Page of a job's rows ordered by object key, for display.
    async fn find_page(&self, job_id: &JobId, offset: u64, limit: u32) -> Result<Vec<WorkItem>>;

    async fn count_by_job(&self, job_id: &JobId) -> Result<u64>;

    /// Remove every row of a job, returning how many were removed.
    async fn delete_by_job(&self, job_id: &JobId) -> Result<u64>;
}

/// SQLite implementation of [`CatalogRepository`]
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkItemRow {
    id: i64,
    job_id: String,
    object_key: String,
    object_size: i64,
    last_position: i64,
    status: String,
    local_full_path: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = SyncError;

    fn try_from(row: WorkItemRow) -> Result<Self> {
        let status: WorkItemStatus = row.status.parse()?;
        Ok(WorkItem {
            id: Some(row.id),
            job_id: JobId::from_string(&row.job_id)
                .map_err(|_| SyncError::Database(format!("Invalid job_id: {}", row.job_id)))?,
            object_key: row.object_key,
            object_size: to_u64("object_size", row.object_size)?,
            last_position: to_u64("last_position", row.last_position)?,
            status,
            local_full_path: row.local_full_path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_u64(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| SyncError::Database(format!("Negative {}: {}", column, value)))
}

fn to_i64(column: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| SyncError::Database(format!("{} out of range: {}", column, value)))
}

const SELECT_ITEMS: &str = r#"
    SELECT id, job_id, object_key, object_size, last_position, status,
           local_full_path, created_at, updated_at
    FROM blob_objects
"#;

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn batch_scan(&self, job_id: &JobId, offset: u64, limit: u32) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, WorkItemRow>(&format!(
            "{} WHERE job_id = ? ORDER BY id ASC LIMIT ? OFFSET ?",
            SELECT_ITEMS
        ))
        .bind(job_id.to_string())
        .bind(i64::from(limit))
        .bind(to_i64("offset", offset)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkItem::try_from).collect()
    }

    async fn commit(&self, batch: CatalogBatch) -> Result<Vec<WorkItem>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut committed = Vec::with_capacity(batch.len());

        for mut item in batch.into_items() {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO blob_objects (
                    job_id, object_key, object_size, last_position, status,
                    local_full_path, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (job_id, object_key) DO UPDATE SET
                    object_size = excluded.object_size,
                    last_position = excluded.last_position,
                    status = excluded.status,
                    local_full_path = excluded.local_full_path,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
            )
            .bind(item.job_id.to_string())
            .bind(&item.object_key)
            .bind(to_i64("object_size", item.object_size)?)
            .bind(to_i64("last_position", item.last_position)?)
            .bind(item.status.as_str())
            .bind(&item.local_full_path)
            .bind(item.created_at)
            .bind(item.updated_at)
            .fetch_one(&mut *tx)
            .await?;

            item.id = Some(id);
            committed.push(item);
        }

        tx.commit().await?;
        debug!(rows = committed.len(), "Committed catalog batch");
        Ok(committed)
    }

    async fn update_checkpoint(
        &self,
        job_id: &JobId,
        object_key: &str,
        last_position: u64,
        now: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE blob_objects SET last_position = ?, updated_at = ? WHERE job_id = ? AND object_key = ?",
        )
        .bind(to_i64("last_position", last_position)?)
        .bind(now)
        .bind(job_id.to_string())
        .bind(object_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Database(format!(
                "No catalog row for {} in job {}",
                object_key, job_id
            )));
        }
        Ok(())
    }

    async fn find_by_key(&self, job_id: &JobId, object_key: &str) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, WorkItemRow>(&format!(
            "{} WHERE job_id = ? AND object_key = ?",
            SELECT_ITEMS
        ))
        .bind(job_id.to_string())
        .bind(object_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkItem::try_from).transpose()
    }

    async fn find_by_keys(&self, job_id: &JobId, object_keys: &[&str]) -> Result<Vec<WorkItem>> {
        if object_keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; object_keys.len()].join(", ");
        let sql = format!(
            "{} WHERE job_id = ? AND object_key IN ({})",
            SELECT_ITEMS, placeholders
        );
        let mut query = sqlx::query_as::<_, WorkItemRow>(&sql).bind(job_id.to_string());
        for key in object_keys {
            query = query.bind(*key);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(WorkItem::try_from).collect()
    }

    async fn find_page(&self, job_id: &JobId, offset: u64, limit: u32) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, WorkItemRow>(&format!(
            "{} WHERE job_id = ? ORDER BY object_key ASC LIMIT ? OFFSET ?",
            SELECT_ITEMS
        ))
        .bind(job_id.to_string())
        .bind(i64::from(limit))
        .bind(to_i64("offset", offset)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkItem::try_from).collect()
    }

    async fn count_by_job(&self, job_id: &JobId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blob_objects WHERE job_id = ?")
            .bind(job_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        to_u64("count", count)
    }

    async fn delete_by_job(&self, job_id: &JobId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM blob_objects WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
