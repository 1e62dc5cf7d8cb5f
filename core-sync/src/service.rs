//! # Sync Job Service
//!
//! Management surface for sync jobs: create, inspect and delete jobs, page
//! through their work items, and trigger runs.
//!
//! Creating a job registers its recurring trigger before the job row is
//! written; if the write fails the trigger is removed again so no timer
//! outlives a job that was never stored. Timers live in memory, so
//! [`SyncJobService::restore_schedules`] re-registers every stored job when
//! the process starts.

use crate::catalog::CatalogRepository;
use crate::job::{CreateJobRequest, Job, JobId};
use crate::orchestrator::{RunSummary, SyncDependencies, SyncOrchestrator};
use crate::repository::JobRepository;
use crate::work_item::WorkItemPage;
use crate::{Result, SyncError};
use bridge_traits::background::{RecurringTrigger, TriggerHandle, TriggerHandler, TriggerStatus};
use bridge_traits::connector::ConnectorFactory;
use bridge_traits::error::BridgeError;
use bridge_traits::time::Clock;
use core_runtime::logging::redact_if_sensitive;
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Largest page [`SyncJobService::list_work_items`] returns.
pub const MAX_WORK_ITEM_PAGE: u32 = 1000;

pub struct SyncJobService {
    jobs: Arc<dyn JobRepository>,
    catalog: Arc<dyn CatalogRepository>,
    connectors: Arc<dyn ConnectorFactory>,
    clock: Arc<dyn Clock>,
    trigger: Arc<dyn RecurringTrigger>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncJobService {
    pub fn new(
        deps: SyncDependencies,
        trigger: Arc<dyn RecurringTrigger>,
        orchestrator: Arc<SyncOrchestrator>,
    ) -> Self {
        Self {
            jobs: deps.jobs,
            catalog: deps.catalog,
            connectors: deps.connectors,
            clock: deps.clock,
            trigger,
            orchestrator,
        }
    }

    /// Create a job and register its recurring trigger.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a malformed request
    /// - [`SyncError::Configuration`] for unusable connector settings
    /// - [`SyncError::Scheduler`] if the trigger cannot be registered
    /// - [`SyncError::Database`] if the job cannot be stored
    #[instrument(skip(self, request), fields(job_name = %request.job_name))]
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobId> {
        let validated = request.validate()?;

        let connector_type = validated.connector_config.connector_type();
        if !self.connectors.supports(connector_type) {
            return Err(SyncError::Configuration(format!(
                "No connector available for type {}",
                connector_type
            )));
        }

        for (key, value) in &request.connector_config {
            debug!(
                key = %key,
                value = %redact_if_sensitive(key, &value.to_string()),
                "Connector setting"
            );
        }

        let job = Job::new(JobId::new(), validated, self.clock.unix_timestamp());
        self.register(&job).await?;

        if let Err(e) = self.jobs.insert(&job).await {
            warn!(job_id = %job.job_id, error = %e, "Storing job failed, removing its trigger");
            if let Err(unschedule_error) = self.trigger.unschedule(&job.job_id.to_string()).await {
                error!(
                    job_id = %job.job_id,
                    error = %unschedule_error,
                    "Could not remove trigger of unsaved job"
                );
            }
            return Err(e);
        }

        info!(
            job_id = %job.job_id,
            schedule = %job.schedule,
            connector_type = %job.connector_type,
            "Created sync job"
        );
        Ok(job.job_id)
    }

    async fn register(&self, job: &Job) -> Result<TriggerHandle> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let job_id = job.job_id;

        let handler: TriggerHandler = Arc::new(move || {
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                match orchestrator.run(&job_id).await {
                    Ok(summary) => {
                        debug!(job_id = %job_id, processed = summary.processed, "Scheduled run finished");
                        Ok(())
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "Scheduled run failed");
                        Err(BridgeError::OperationFailed(e.to_string()))
                    }
                }
            }
            .boxed()
        });

        self.trigger
            .schedule(&job_id.to_string(), &job.job_name, job.schedule, handler)
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.jobs.find_all().await
    }

    async fn require_job(&self, job_id: &JobId) -> Result<Job> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let job_id = JobId::from_string(job_id)?;
        self.require_job(&job_id).await
    }

    /// Delete a job and cancel its trigger.
    ///
    /// The job's work items and downloaded files are kept.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        let job_id = JobId::from_string(job_id)?;
        self.require_job(&job_id).await?;

        let key = job_id.to_string();
        if self.trigger.is_scheduled(&key).await {
            self.trigger
                .unschedule(&key)
                .await
                .map_err(|e| SyncError::Scheduler(e.to_string()))?;
        }

        self.jobs.delete(&job_id).await?;
        info!(job_id = %job_id, "Deleted sync job");
        Ok(())
    }

    /// Page through a job's work items, ordered by object key.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] for a malformed id or a `limit` outside
    /// `1..=1000`.
    pub async fn list_work_items(&self, job_id: &str, offset: u64, limit: u32) -> Result<WorkItemPage> {
        let job_id = JobId::from_string(job_id)?;
        if !(1..=MAX_WORK_ITEM_PAGE).contains(&limit) {
            return Err(SyncError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_WORK_ITEM_PAGE
            )));
        }

        let total_objects = self.catalog.count_by_job(&job_id).await?;
        let objects = self.catalog.find_page(&job_id, offset, limit).await?;

        Ok(WorkItemPage {
            total_objects,
            limit,
            offset,
            objects,
        })
    }

    /// Run one pass of a job on the caller's task.
    pub async fn run_now(&self, job_id: &str) -> Result<RunSummary> {
        let job_id = JobId::from_string(job_id)?;
        self.orchestrator.run(&job_id).await
    }

    /// Status of the latest scheduled firing, if the job has a trigger.
    pub async fn trigger_status(&self, job_id: &str) -> Result<Option<TriggerStatus>> {
        let job_id = JobId::from_string(job_id)?;
        Ok(self.trigger.status(&job_id.to_string()).await)
    }

    /// Register the trigger of every stored job.
    ///
    /// A job whose trigger cannot be registered is logged and skipped.
    /// Returns how many triggers were registered.
    pub async fn restore_schedules(&self) -> Result<usize> {
        let jobs = self.jobs.find_all().await?;
        let mut restored = 0;

        for job in &jobs {
            match self.register(job).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Could not restore schedule"),
            }
        }

        info!(restored, total = jobs.len(), "Restored job schedules");
        Ok(restored)
    }
}
