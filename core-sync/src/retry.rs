//! # Retry Policy
//!
//! Bounded exponential retry for connector calls.
//!
//! The first attempt runs immediately; attempt `n + 1` waits
//! `delay * backoff^(n - 1)`. Only errors reporting
//! [`BridgeError::is_transient`] are retried, so configuration mistakes and
//! missing objects fail on the first attempt.

use backon::{ExponentialBuilder, Retryable};
use bridge_traits::error::BridgeError;
use core_runtime::config::EngineConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a single wait, far above any realistic configuration.
const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Wait before the first retry
    pub delay: Duration,
    /// Multiplier applied to the wait after every retry
    pub backoff: u32,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            backoff: backoff.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retry_count, config.retry_delay, config.retry_backoff)
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1)
    }

    fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.delay)
            .with_max_delay(MAX_DELAY)
            .with_factor(self.backoff as f32)
            .with_max_times(self.attempts.saturating_sub(1) as usize)
    }

    /// Run `f` under this policy. `operation` names the call in retry logs.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        f.retry(self.builder())
            .when(BridgeError::is_transient)
            .notify(|err: &BridgeError, wait: Duration| {
                warn!(
                    operation,
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "Transient failure, retrying"
                );
            })
            .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
