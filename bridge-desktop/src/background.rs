//! Recurring Job Trigger Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{IntervalClass, RecurringTrigger, TriggerHandle, TriggerHandler, TriggerStatus},
    error::{BridgeError, Result},
    time::{Clock, SystemClock},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of job runs allowed to execute at the same time across all jobs.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 2;

type TimerTable = Arc<RwLock<HashMap<String, TimerInfo>>>;

/// Tokio-based recurring trigger.
///
/// Every registered job owns one timer task. On each tick the timer spawns a
/// run that first waits for a slot in the shared worker pool, so no more than
/// `worker_pool_size` runs execute concurrently no matter how many jobs fire.
pub struct TokioJobTrigger {
    timers: TimerTable,
    pool: Arc<Semaphore>,
    pool_size: usize,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    generations: AtomicU64,
}

struct TimerInfo {
    job_name: String,
    interval: IntervalClass,
    /// Distinguishes a replaced timer from its successor under the same id.
    generation: u64,
    status: TriggerStatus,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    last_run: Option<i64>,
    next_run: Option<i64>,
}

impl TokioJobTrigger {
    /// Create a trigger with the default two-slot worker pool.
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_WORKER_POOL_SIZE)
    }

    /// Create a trigger with a custom worker pool size.
    pub fn with_pool_size(pool_size: usize) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_pool_size_and_clock(pool_size, clock)
    }

    /// Create a trigger with a custom worker pool size and clock.
    pub fn with_pool_size_and_clock(pool_size: usize, clock: Arc<dyn Clock>) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            timers: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            clock,
            shutdown: CancellationToken::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Configured worker pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Worker slots not currently held by a run.
    pub fn available_slots(&self) -> usize {
        self.pool.available_permits()
    }

    /// Unix milliseconds of the next expected firing for `job_id`.
    pub async fn next_run_millis(&self, job_id: &str) -> Option<i64> {
        let timers = self.timers.read().await;
        timers.get(job_id).and_then(|info| info.next_run)
    }

    /// Unix milliseconds of the last completed firing for `job_id`.
    pub async fn last_run_millis(&self, job_id: &str) -> Option<i64> {
        let timers = self.timers.read().await;
        timers.get(job_id).and_then(|info| info.last_run)
    }

    fn duration_to_millis(duration: Duration) -> i64 {
        duration.as_millis().min(i64::MAX as u128) as i64
    }

    fn stop_timer(info: TimerInfo) {
        info.cancel.cancel();
        info.handle.abort();
    }

    async fn update_timer<F>(timers: &TimerTable, job_id: &str, generation: u64, update: F)
    where
        F: FnOnce(&mut TimerInfo),
    {
        let mut timers = timers.write().await;
        if let Some(info) = timers.get_mut(job_id) {
            if info.generation == generation {
                update(info);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_timer(
        timers: TimerTable,
        job_id: String,
        generation: u64,
        handler: TriggerHandler,
        period: Duration,
        pool: Arc<Semaphore>,
        cancel: CancellationToken,
        clock: Arc<dyn Clock>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let period_millis = Self::duration_to_millis(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(job_id = %job_id, "Timer cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let now = clock.unix_timestamp_millis();
                    Self::update_timer(&timers, &job_id, generation, |info| {
                        info.status = TriggerStatus::Running;
                        info.next_run = Some(now.saturating_add(period_millis));
                    })
                    .await;

                    tokio::spawn(Self::dispatch(
                        Arc::clone(&timers),
                        job_id.clone(),
                        generation,
                        Arc::clone(&handler),
                        Arc::clone(&pool),
                        Arc::clone(&clock),
                    ));
                }
            }
        }
    }

    async fn dispatch(
        timers: TimerTable,
        job_id: String,
        generation: u64,
        handler: TriggerHandler,
        pool: Arc<Semaphore>,
        clock: Arc<dyn Clock>,
    ) {
        let _permit = match pool.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!(job_id = %job_id, "Worker pool closed; dropping run");
                return;
            }
        };

        debug!(job_id = %job_id, "Run acquired worker slot");
        let result = handler().await;

        let now = clock.unix_timestamp_millis();
        let status = match result {
            Ok(()) => TriggerStatus::Completed,
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Scheduled run failed");
                TriggerStatus::Failed
            }
        };
        Self::update_timer(&timers, &job_id, generation, |info| {
            info.status = status;
            info.last_run = Some(now);
        })
        .await;
    }
}

impl Default for TokioJobTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecurringTrigger for TokioJobTrigger {
    async fn schedule(
        &self,
        job_id: &str,
        job_name: &str,
        interval: IntervalClass,
        handler: TriggerHandler,
    ) -> Result<TriggerHandle> {
        if self.shutdown.is_cancelled() {
            return Err(BridgeError::NotAvailable(
                "Trigger has been shut down".to_string(),
            ));
        }

        let period = interval.period();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let next_run = self
            .clock
            .unix_timestamp_millis()
            .saturating_add(Self::duration_to_millis(period));

        let mut timers = self.timers.write().await;
        if let Some(previous) = timers.remove(job_id) {
            debug!(job_id = job_id, "Replacing existing timer");
            Self::stop_timer(previous);
        }

        let handle = tokio::spawn(Self::run_timer(
            Arc::clone(&self.timers),
            job_id.to_string(),
            generation,
            handler,
            period,
            Arc::clone(&self.pool),
            cancel.clone(),
            Arc::clone(&self.clock),
        ));

        timers.insert(
            job_id.to_string(),
            TimerInfo {
                job_name: job_name.to_string(),
                interval,
                generation,
                status: TriggerStatus::Scheduled,
                handle,
                cancel,
                last_run: None,
                next_run: Some(next_run),
            },
        );

        info!(
            job_id = job_id,
            job_name = job_name,
            interval = %interval,
            interval_secs = period.as_secs(),
            "Job scheduled"
        );

        Ok(TriggerHandle {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            interval,
            next_run_millis: next_run,
        })
    }

    async fn unschedule(&self, job_id: &str) -> Result<()> {
        let removed = {
            let mut timers = self.timers.write().await;
            timers.remove(job_id)
        };

        match removed {
            Some(info) => {
                info!(job_id = job_id, job_name = %info.job_name, interval = %info.interval, "Job unscheduled");
                Self::stop_timer(info);
                Ok(())
            }
            None => Err(BridgeError::OperationFailed(format!(
                "No timer registered for job: {}",
                job_id
            ))),
        }
    }

    async fn is_scheduled(&self, job_id: &str) -> bool {
        let timers = self.timers.read().await;
        timers.contains_key(job_id)
    }

    async fn status(&self, job_id: &str) -> Option<TriggerStatus> {
        let timers = self.timers.read().await;
        timers.get(job_id).map(|info| info.status)
    }

    async fn scheduled_jobs(&self) -> Vec<String> {
        let timers = self.timers.read().await;
        let mut ids: Vec<String> = timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<TimerInfo> = {
            let mut timers = self.timers.write().await;
            timers.drain().map(|(_, info)| info).collect()
        };
        let count = drained.len();
        for info in drained {
            Self::stop_timer(info);
        }
        info!(timers = count, "Trigger shut down");
    }
}
