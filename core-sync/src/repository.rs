//! # Sync Job Repository
//!
//! Provides database persistence for sync jobs.
//!
//! ## Overview
//!
//! This repository handles CRUD operations for jobs, including:
//! - Inserting newly created jobs
//! - Listing jobs for the management surface and schedule restoration
//! - Recording the informational job status
//! - Deleting jobs (their work items stay in the catalog)

use crate::job::{Job, JobId, JobStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::background::IntervalClass;
use bridge_traits::connector::{ConnectorConfig, ConnectorType};
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for job persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    ///
    /// # Errors
    ///
    /// Returns an error if the id already exists or the database operation fails
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find a job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// All jobs, oldest first
    async fn find_all(&self) -> Result<Vec<Job>>;

    /// Update the informational status of a job
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] if the job doesn't exist
    async fn update_status(&self, id: &JobId, status: JobStatus, now: i64) -> Result<()>;

    /// Delete a job, returning whether a row was removed
    async fn delete(&self, id: &JobId) -> Result<bool>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`JobRepository`]
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    /// Create a new SQLite job repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job
#[derive(Debug, FromRow)]
struct JobRow {
    job_id: String,
    job_name: String,
    connector_type: String,
    schedule: String,
    connector_config: String,
    job_status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = SyncError;

    fn try_from(row: JobRow) -> Result<Self> {
        let connector_type: ConnectorType = row.connector_type.parse().map_err(|_| {
            SyncError::Database(format!("Invalid connector_type: {}", row.connector_type))
        })?;
        let schedule: IntervalClass = row
            .schedule
            .parse()
            .map_err(|_| SyncError::Database(format!("Invalid schedule: {}", row.schedule)))?;
        let connector_config: ConnectorConfig = serde_json::from_str(&row.connector_config)?;

        Ok(Job {
            job_id: JobId::from_string(&row.job_id)
                .map_err(|_| SyncError::Database(format!("Invalid job_id: {}", row.job_id)))?,
            job_name: row.job_name,
            connector_type,
            schedule,
            connector_config,
            job_status: row
                .job_status
                .parse()
                .map_err(|_| SyncError::Database(format!("Invalid job_status: {}", row.job_status)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_JOBS: &str = r#"
    SELECT job_id, job_name, connector_type, schedule, connector_config,
           job_status, created_at, updated_at
    FROM jobs
"#;

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        let connector_config = serde_json::to_string(&job.connector_config)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, job_name, connector_type, schedule, connector_config,
                job_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.job_id.to_string())
        .bind(&job.job_name)
        .bind(job.connector_type.as_str())
        .bind(job.schedule.as_str())
        .bind(connector_config)
        .bind(job.job_status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!("{} WHERE job_id = ?", SELECT_JOBS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Job>> {
        let rows =
            sqlx::query_as::<_, JobRow>(&format!("{} ORDER BY created_at ASC, job_id ASC", SELECT_JOBS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update_status(&self, id: &JobId, status: JobStatus, now: i64) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET job_status = ?, updated_at = ? WHERE job_id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                job_id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::job::CreateJobRequest;
    use serde_json::json;

    fn job(name: &str, created_at: i64) -> Job {
        let request = CreateJobRequest {
            job_name: name.to_string(),
            connector_type: "S3".to_string(),
            schedule: "half-hourly".to_string(),
            connector_config: json!({"bucket_name": "media", "prefix": "raw/"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        Job::new(JobId::new(), request.validate().unwrap(), created_at)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SqliteJobRepository::new(create_test_pool().await.unwrap());
        let job = job("media", 100);

        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(repo.find_by_id(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let repo = SqliteJobRepository::new(create_test_pool().await.unwrap());
        let job = job("media", 100);

        repo.insert(&job).await.unwrap();
        assert!(matches!(
            repo.insert(&job).await,
            Err(SyncError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_find_all_is_oldest_first() {
        let repo = SqliteJobRepository::new(create_test_pool().await.unwrap());
        let newer = job("newer", 200);
        let older = job("older", 100);
        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();

        let names: Vec<String> = repo
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_name)
            .collect();
        assert_eq!(names, vec!["older", "newer"]);
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = SqliteJobRepository::new(create_test_pool().await.unwrap());
        let job = job("media", 100);
        repo.insert(&job).await.unwrap();

        repo.update_status(&job.job_id, JobStatus::Failed, 150)
            .await
            .unwrap();
        let found = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found.job_status, JobStatus::Failed);
        assert_eq!(found.updated_at, 150);

        assert!(matches!(
            repo.update_status(&JobId::new(), JobStatus::Failed, 150).await,
            Err(SyncError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_job() {
        let repo = SqliteJobRepository::new(create_test_pool().await.unwrap());
        let job = job("media", 100);
        repo.insert(&job).await.unwrap();

        assert!(repo.delete(&job.job_id).await.unwrap());
        assert!(repo.find_by_id(&job.job_id).await.unwrap().is_none());
        assert!(!repo.delete(&job.job_id).await.unwrap());
    }
}
