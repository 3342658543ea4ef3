//! Retry-with-slot decorator
//!
//! Wraps one fetch. A transient failure is retried only after a fresh slot is
//! granted by the shared [`SlotSource`], so retries are paced by the same
//! quota as first attempts. Terminal failures propagate immediately and never
//! consume a slot.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::fetcher::classify::{FailureKind, RetryContext};
use crate::fetcher::{ErrorClass, FetchError};
use crate::metrics;
use crate::orchestrator::config::{calculate_backoff, OrchestratorConfig, MAX_ATTEMPTS};
use crate::orchestrator::rate_limit::SlotSource;

/// Attempt budget and backoff for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Initial backoff in milliseconds, doubled per retry (0 disables)
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and no backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms: 0,
        }
    }

    /// Single attempt, never retried
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Policy from orchestrator configuration
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.max_attempts).with_backoff_ms(config.initial_backoff_ms)
    }

    /// Set the initial backoff
    pub fn with_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Backoff before the given retry (0-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        calculate_backoff(self.initial_backoff_ms, retry)
    }
}

/// Run `op` until it succeeds, fails terminally, or runs out of attempts.
///
/// The first attempt runs immediately; callers acquire its slot themselves.
/// Every retry waits for a fresh slot from `slots` first.
///
/// # Arguments
/// * `slots` - Shared slot source pacing retries
/// * `policy` - Attempt budget and backoff
/// * `target` - Human-readable label for log lines
/// * `op` - Produces one attempt per call
pub async fn retry_with_slot<S, F, Fut, T>(
    slots: &S,
    policy: RetryPolicy,
    target: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    S: SlotSource + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt: u32 = 1;
    let mut last_failure: Option<(FailureKind, String)> = None;

    loop {
        let error = match op().await {
            Ok(value) => {
                if let Some((kind, message)) = last_failure {
                    let ctx = RetryContext::new(
                        attempt,
                        policy.max_attempts,
                        kind,
                        Duration::ZERO,
                        target,
                        message,
                    );
                    info!("{}", ctx.format_success());
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match error.class() {
            ErrorClass::Terminal(reason) => {
                debug!(
                    target_label = %target,
                    attempt,
                    reason = ?reason,
                    error = %error,
                    "Terminal failure, not retrying"
                );
                return Err(error);
            }
            ErrorClass::Transient if attempt >= policy.max_attempts => {
                let ctx = RetryContext::new(
                    attempt,
                    policy.max_attempts,
                    FailureKind::of(&error),
                    Duration::ZERO,
                    target,
                    error.to_string(),
                );
                warn!("{}", ctx.format_failure());
                return Err(error);
            }
            ErrorClass::Transient => {
                let backoff = policy.backoff_for(attempt - 1);
                let ctx = RetryContext::new(
                    attempt + 1,
                    policy.max_attempts,
                    FailureKind::of(&error),
                    backoff,
                    target,
                    error.to_string(),
                );
                warn!(error = %error, "{}", ctx.format_retry());
                metrics::record_retry(error.kind(), attempt, backoff);
                last_failure = Some((FailureKind::of(&error), error.to_string()));

                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                slots.request_slot().await?;
                attempt += 1;
            }
        }
    }
}

/// Acquire the first attempt's slot, then run `op` under [`retry_with_slot`].
///
/// Outcome is recorded in metrics once per fetch, not per attempt.
pub async fn fetch_with_slot<S, F, Fut, T>(
    slots: &S,
    policy: RetryPolicy,
    target: &str,
    op: F,
) -> Result<T, FetchError>
where
    S: SlotSource + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let result = match slots.request_slot().await {
        Ok(()) => retry_with_slot(slots, policy, target, op).await,
        Err(e) => Err(e.into()),
    };
    match &result {
        Ok(_) => metrics::record_fetch_completed(),
        Err(e) => metrics::record_fetch_failed(e.kind()),
    }
    result
}
