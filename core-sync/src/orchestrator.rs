//! # Sync Orchestrator
//!
//! Runs one pass of a job: list the remote namespace page by page, resolve
//! each page against the catalog, fetch what the resolver queued, and commit
//! the final item states once per page.
//!
//! ## Workflow
//!
//! 1. Load the job and bind a connector to its configuration
//! 2. Claim the job so a second overlapping run is refused
//! 3. For every listing page (following continuation tokens):
//!    - resolve the page into queued work items
//!    - fetch each queued item in listing order
//!    - commit the final item states in one transaction
//! 4. Force an audit flush, whether or not the pages succeeded
//!
//! A failed object never aborts the run; it is recorded `Failed` and picked
//! up by the next run. A listing or commit failure aborts the run, and the
//! next run resumes from whatever was persisted.

use crate::audit::AuditBuffer;
use crate::catalog::{CatalogBatch, CatalogRepository};
use crate::executor::ChunkedFetchExecutor;
use crate::job::{Job, JobId, JobStatus};
use crate::repository::JobRepository;
use crate::resolver::ListingDiffResolver;
use crate::retry::RetryPolicy;
use crate::{Result, SyncError};
use bridge_traits::connector::{ConnectorFactory, ObjectConnector};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::EngineConfig;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, instrument, warn};

/// Shared services the sync components are built from
#[derive(Clone)]
pub struct SyncDependencies {
    pub jobs: Arc<dyn JobRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub fs: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
}

/// Counters for one completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub processed: usize,
    pub failed: usize,
    /// Zero-size objects recorded during this run
    pub skipped: usize,
}

pub struct SyncOrchestrator {
    jobs: Arc<dyn JobRepository>,
    catalog: Arc<dyn CatalogRepository>,
    connectors: Arc<dyn ConnectorFactory>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    resolver: ListingDiffResolver,
    executor: ChunkedFetchExecutor,
    retry: RetryPolicy,
    json_root: PathBuf,
    max_json_size: usize,
    active_runs: Mutex<HashSet<JobId>>,
}

/// Releases a job's run claim when dropped.
struct RunGuard<'a> {
    active_runs: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDependencies, config: &EngineConfig) -> Self {
        let retry = RetryPolicy::from_config(config);

        let resolver = ListingDiffResolver::new(
            deps.catalog.clone(),
            deps.clock.clone(),
            retry,
            config.db_rows_retrieval_limit,
        );
        let executor = ChunkedFetchExecutor::new(
            deps.catalog.clone(),
            deps.fs.clone(),
            deps.clock.clone(),
            retry,
            config.download_root.clone(),
        );

        Self {
            jobs: deps.jobs,
            catalog: deps.catalog,
            connectors: deps.connectors,
            fs: deps.fs,
            clock: deps.clock,
            resolver,
            executor,
            retry,
            json_root: config.json_root.clone(),
            max_json_size: config.max_json_size,
            active_runs: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a run of `job_id` is in flight in this instance.
    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.active_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_id)
    }

    fn claim(&self, job_id: &JobId) -> Result<RunGuard<'_>> {
        let mut active = self
            .active_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !active.insert(*job_id) {
            return Err(SyncError::RunInProgress {
                job_id: job_id.to_string(),
            });
        }

        Ok(RunGuard {
            active_runs: &self.active_runs,
            job_id: *job_id,
        })
    }

    /// Run one sync pass of `job_id`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::JobNotFound`] if the job does not exist
    /// - [`SyncError::Configuration`] if no connector can be bound
    /// - [`SyncError::RunInProgress`] if the job is already running here
    /// - listing, catalog or audit write failures that aborted the run
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: &JobId) -> Result<RunSummary> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if !self.connectors.supports(job.connector_type) {
            return Err(SyncError::Configuration(format!(
                "No connector available for type {}",
                job.connector_type
            )));
        }
        let connector = self.connectors.connect(&job.connector_config)?;

        let _guard = self.claim(job_id)?;
        info!(job_name = %job.job_name, "Starting sync run");

        let mut audit = AuditBuffer::new(
            job.job_id,
            self.json_root.clone(),
            self.max_json_size,
            self.fs.clone(),
            self.clock.clone(),
        );

        let result = self.sync_pages(&job, connector.as_ref(), &mut audit).await;
        let flushed = audit.flush_all().await;

        let outcome = match (result, flushed) {
            (Ok(summary), Ok(_)) => Ok(summary),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(flush_error)) => {
                warn!(error = %flush_error, "Final audit flush failed");
                Err(e)
            }
        };

        match &outcome {
            Ok(summary) => info!(
                pages = summary.pages,
                processed = summary.processed,
                failed = summary.failed,
                skipped = summary.skipped,
                "Sync run completed"
            ),
            Err(e) => error!(error = %e, "Sync run aborted"),
        }

        self.record_status(&job, outcome.is_ok()).await;
        outcome
    }

    async fn sync_pages(
        &self,
        job: &Job,
        connector: &dyn ObjectConnector,
        audit: &mut AuditBuffer,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .retry
                .run("list", || connector.list(token.clone()))
                .await?;
            summary.pages += 1;

            let resolved = self.resolver.resolve(&job.job_id, &page, connector).await?;
            summary.skipped += resolved.skipped;

            let mut batch = CatalogBatch::new();
            for item in resolved.queued {
                let outcome = self.executor.fetch(item, connector, audit).await;
                if outcome.is_success() {
                    summary.processed += 1;
                } else {
                    summary.failed += 1;
                }
                batch.upsert(outcome.item);
            }
            self.catalog.commit(batch).await?;

            debug!(
                page = summary.pages,
                listed = page.objects.len(),
                processed = summary.processed,
                failed = summary.failed,
                "Listing page done"
            );

            match page.next_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    return Err(SyncError::Transient(format!(
                        "Listing cursor did not advance past {}",
                        next
                    )));
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(summary)
    }

    async fn record_status(&self, job: &Job, succeeded: bool) {
        let status = if succeeded {
            JobStatus::Scheduled
        } else {
            JobStatus::Failed
        };
        if job.job_status == status {
            return;
        }

        if let Err(e) = self
            .jobs
            .update_status(&job.job_id, status, self.clock.unix_timestamp())
            .await
        {
            warn!(error = %e, status = status.as_str(), "Could not record job status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalogRepository;
    use crate::db::create_test_pool;
    use crate::job::CreateJobRequest;
    use crate::repository::SqliteJobRepository;
    use crate::testing::MockConnector;
    use crate::work_item::WorkItemStatus;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::connector::{
        ConnectorConfig, ConnectorType, FetchedRange, ListedObject, ListingPage,
    };
    use bridge_traits::error::BridgeError;
    use bridge_traits::time::FixedClock;
    use bytes::Bytes;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Hands out the same connector for every configuration.
    struct StaticFactory(Arc<dyn ObjectConnector>);

    impl ConnectorFactory for StaticFactory {
        fn supports(&self, connector_type: ConnectorType) -> bool {
            connector_type == ConnectorType::S3
        }

        fn connect(
            &self,
            _config: &ConnectorConfig,
        ) -> bridge_traits::error::Result<Arc<dyn ObjectConnector>> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        jobs: Arc<SqliteJobRepository>,
        catalog: Arc<SqliteCatalogRepository>,
        orchestrator: Arc<SyncOrchestrator>,
        job_id: JobId,
    }

    async fn fixture(connector: Arc<dyn ObjectConnector>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();
        let jobs = Arc::new(SqliteJobRepository::new(pool.clone()));
        let catalog = Arc::new(SqliteCatalogRepository::new(pool));

        let config = EngineConfig::builder()
            .json_root(dir.path().join("json"))
            .download_root(dir.path().join("downloads"))
            .retry_count(2)
            .retry_delay(Duration::ZERO)
            .build()
            .unwrap();

        let deps = SyncDependencies {
            jobs: jobs.clone(),
            catalog: catalog.clone(),
            connectors: Arc::new(StaticFactory(connector)),
            fs: Arc::new(TokioFileSystem::new().with_durable_appends(false)),
            clock: Arc::new(FixedClock::at_unix(1_700_000_000)),
        };

        let request = CreateJobRequest {
            job_name: "nightly".into(),
            connector_type: "S3".into(),
            schedule: "hourly".into(),
            connector_config: json!({ "bucket_name": "media" })
                .as_object()
                .cloned()
                .unwrap(),
        };
        let job = Job::new(JobId::new(), request.validate().unwrap(), 1);
        jobs.insert(&job).await.unwrap();

        Fixture {
            dir,
            jobs,
            catalog,
            orchestrator: Arc::new(SyncOrchestrator::new(deps, &config)),
            job_id: job.job_id,
        }
    }

    fn single_page(objects: Vec<ListedObject>) -> ListingPage {
        ListingPage {
            objects,
            next_token: None,
        }
    }

    fn whole_object(len: usize) -> FetchedRange {
        FetchedRange {
            data: Bytes::from(vec![b'x'; len]),
            next_position: len as u64,
        }
    }

    fn audit_files(fx: &Fixture) -> usize {
        std::fs::read_dir(fx.dir.path().join("json").join(fx.job_id.to_string()))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let fx = fixture(Arc::new(MockConnector::new())).await;
        let result = fx.orchestrator.run(&JobId::new()).await;
        assert!(matches!(result, Err(SyncError::JobNotFound { .. })));
    }

    #[tokio::test]
    async fn test_run_fetches_and_commits_page() {
        let mut connector = MockConnector::new();
        connector.expect_list().with(eq(None)).times(1).returning(|_| {
            Ok(single_page(vec![
                ListedObject::new("a.txt", 4),
                ListedObject::new("empty.txt", 0),
            ]))
        });
        connector
            .expect_fetch_range()
            .with(eq("a.txt"), eq(0u64), eq(4u64))
            .times(1)
            .returning(|_, _, _| Ok(whole_object(4)));

        let fx = fixture(Arc::new(connector)).await;
        let summary = fx.orchestrator.run(&fx.job_id).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                pages: 1,
                processed: 1,
                failed: 0,
                skipped: 1,
            }
        );

        let item = fx.catalog.find_by_key(&fx.job_id, "a.txt").await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Processed);
        assert!(item.local_full_path.is_some());
        assert_eq!(audit_files(&fx), 1);
        assert!(!fx.orchestrator.is_running(&fx.job_id));
    }

    #[tokio::test]
    async fn test_failed_item_does_not_abort_run() {
        let mut connector = MockConnector::new();
        connector.expect_list().returning(|_| {
            Ok(single_page(vec![
                ListedObject::new("bad.txt", 4),
                ListedObject::new("good.txt", 4),
            ]))
        });
        connector
            .expect_fetch_range()
            .with(eq("bad.txt"), eq(0u64), eq(4u64))
            .returning(|_, _, _| Err(BridgeError::Configuration("denied".into())));
        connector
            .expect_fetch_range()
            .with(eq("good.txt"), eq(0u64), eq(4u64))
            .returning(|_, _, _| Ok(whole_object(4)));

        let fx = fixture(Arc::new(connector)).await;
        let summary = fx.orchestrator.run(&fx.job_id).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        let bad = fx.catalog.find_by_key(&fx.job_id, "bad.txt").await.unwrap().unwrap();
        assert_eq!(bad.status, WorkItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_follows_continuation_tokens() {
        let mut connector = MockConnector::new();
        connector
            .expect_list()
            .with(eq(None))
            .times(1)
            .returning(|_| {
                Ok(ListingPage {
                    objects: vec![ListedObject::new("a.txt", 0)],
                    next_token: Some("a.txt".into()),
                })
            });
        connector
            .expect_list()
            .with(eq(Some("a.txt".to_string())))
            .times(1)
            .returning(|_| Ok(single_page(vec![ListedObject::new("b.txt", 0)])));

        let fx = fixture(Arc::new(connector)).await;
        let summary = fx.orchestrator.run(&fx.job_id).await.unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(fx.catalog.count_by_job(&fx.job_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_and_marks_job_failed() {
        let mut connector = MockConnector::new();
        connector
            .expect_list()
            .times(2)
            .returning(|_| Err(BridgeError::Transient("timeout".into())));

        let fx = fixture(Arc::new(connector)).await;
        let result = fx.orchestrator.run(&fx.job_id).await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        let job = fx.jobs.find_by_id(&fx.job_id).await.unwrap().unwrap();
        assert_eq!(job.job_status, JobStatus::Failed);
        // the forced flush still runs
        assert_eq!(audit_files(&fx), 1);
        assert!(!fx.orchestrator.is_running(&fx.job_id));
    }

    #[tokio::test]
    async fn test_stuck_cursor_aborts_run() {
        let mut connector = MockConnector::new();
        connector.expect_list().returning(|_| {
            Ok(ListingPage {
                objects: Vec::new(),
                next_token: Some("same".into()),
            })
        });

        let fx = fixture(Arc::new(connector)).await;
        let result = fx.orchestrator.run(&fx.job_id).await;

        assert!(matches!(result, Err(SyncError::Transient(ref msg)) if msg.contains("same")));
    }

    /// Connector whose listing blocks until released.
    struct GatedConnector {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl ObjectConnector for GatedConnector {
        fn connector_type(&self) -> ConnectorType {
            ConnectorType::S3
        }

        async fn list(
            &self,
            _continuation_token: Option<String>,
        ) -> bridge_traits::error::Result<ListingPage> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ListingPage::default())
        }

        async fn probe_size(&self, object_key: &str) -> bridge_traits::error::Result<u64> {
            Err(BridgeError::NotFound(object_key.to_string()))
        }

        async fn fetch_range(
            &self,
            object_key: &str,
            _start: u64,
            _total_size: u64,
        ) -> bridge_traits::error::Result<FetchedRange> {
            Err(BridgeError::NotFound(object_key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_overlapping_run_is_refused() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let fx = fixture(Arc::new(GatedConnector {
            entered: entered.clone(),
            release: release.clone(),
        }))
        .await;

        let orchestrator = fx.orchestrator.clone();
        let job_id = fx.job_id;
        let first = tokio::spawn(async move { orchestrator.run(&job_id).await });

        entered.notified().await;
        assert!(fx.orchestrator.is_running(&fx.job_id));
        let second = fx.orchestrator.run(&fx.job_id).await;
        assert!(matches!(second, Err(SyncError::RunInProgress { .. })));

        release.notify_one();
        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.pages, 1);
        assert!(!fx.orchestrator.is_running(&fx.job_id));
    }
}
