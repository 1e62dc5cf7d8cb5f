//! Recurring Job Triggers
//!
//! Fires a registered handler on a fixed interval. Implementations guarantee
//! at most one active timer per job id: registering an id again replaces the
//! existing timer rather than adding a second one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Named recurrence period with a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalClass {
    /// Every 5 minutes
    Quinqueminutely,
    /// Every 10 minutes
    Decaminutely,
    /// Every 30 minutes
    HalfHourly,
    Hourly,
    Daily,
    Weekly,
    /// Every 30 days
    Monthly,
}

impl IntervalClass {
    pub const ALL: &'static [IntervalClass] = &[
        IntervalClass::Quinqueminutely,
        IntervalClass::Decaminutely,
        IntervalClass::HalfHourly,
        IntervalClass::Hourly,
        IntervalClass::Daily,
        IntervalClass::Weekly,
        IntervalClass::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalClass::Quinqueminutely => "quinqueminutely",
            IntervalClass::Decaminutely => "decaminutely",
            IntervalClass::HalfHourly => "half-hourly",
            IntervalClass::Hourly => "hourly",
            IntervalClass::Daily => "daily",
            IntervalClass::Weekly => "weekly",
            IntervalClass::Monthly => "monthly",
        }
    }

    pub fn as_secs(&self) -> u64 {
        match self {
            IntervalClass::Quinqueminutely => 300,
            IntervalClass::Decaminutely => 600,
            IntervalClass::HalfHourly => 1_800,
            IntervalClass::Hourly => 3_600,
            IntervalClass::Daily => 86_400,
            IntervalClass::Weekly => 604_800,
            IntervalClass::Monthly => 2_592_000,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl FromStr for IntervalClass {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        IntervalClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == wanted)
            .ok_or_else(|| BridgeError::UnrecognizedSchedule(s.to_string()))
    }
}

impl fmt::Display for IntervalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked on every tick.
pub type TriggerHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Status of the most recent firing of a registered trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// Registered, no run has finished yet
    Scheduled,
    /// A run is waiting for or holding a worker slot
    Running,
    Completed,
    Failed,
}

/// Handle describing a registered timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHandle {
    pub job_id: String,
    pub job_name: String,
    pub interval: IntervalClass,
    /// Unix milliseconds of the first expected firing
    pub next_run_millis: i64,
}

/// Recurring trigger capability.
///
/// The trigger dispatches runs onto a bounded worker pool; it does not
/// suppress overlapping runs of the same job.
#[async_trait]
pub trait RecurringTrigger: Send + Sync {
    /// Register `handler` to fire every `interval`, replacing any timer already
    /// registered under `job_id`.
    async fn schedule(
        &self,
        job_id: &str,
        job_name: &str,
        interval: IntervalClass,
        handler: TriggerHandler,
    ) -> Result<TriggerHandle>;

    /// Cancel and remove the timer for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::OperationFailed`] if nothing is registered under
    /// `job_id`; callers guard with [`RecurringTrigger::is_scheduled`].
    async fn unschedule(&self, job_id: &str) -> Result<()>;

    async fn is_scheduled(&self, job_id: &str) -> bool;

    /// Status of the latest firing, if the job is registered.
    async fn status(&self, job_id: &str) -> Option<TriggerStatus>;

    /// Ids of every registered timer.
    async fn scheduled_jobs(&self) -> Vec<String>;

    /// Cancel every timer. Runs already holding a worker slot finish normally.
    async fn shutdown(&self);
}
