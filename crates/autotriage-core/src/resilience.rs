// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry and fallback policies for telemetry backend calls.
//!
//! Handlers compose them as `with_fallback(policy.execute(..), on_failure)`:
//! every backend call is retried with backoff, and whatever survives the
//! retries is handed to the fallback.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BackendError;

/// How the delay between retry attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// delay * attempt
    ///
    /// First retry: delay * 1
    /// Second retry: delay * 2
    /// Third retry: delay * 3
    #[default]
    Linear,
    /// delay * 2^(attempt-1)
    ExponentialBackoff,
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryStrategy::Linear => f.write_str("linear"),
            RetryStrategy::ExponentialBackoff => f.write_str("exponential"),
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(RetryStrategy::Linear),
            "exponential" | "exponential-backoff" => Ok(RetryStrategy::ExponentialBackoff),
            other => Err(format!("unknown retry strategy '{}'", other)),
        }
    }
}

/// Capped backoff retry applied per backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    /// Delay the backoff is seeded from.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth strategy.
    pub strategy: RetryStrategy,
    /// Timeout for each individual attempt.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::Linear,
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Create a policy without a per-attempt timeout and a cap equal to the
    /// largest uncapped delay.
    pub fn new(max_retries: u32, base_delay: Duration, strategy: RetryStrategy) -> Self {
        let mut policy = Self {
            max_retries,
            base_delay,
            max_delay: Duration::MAX,
            strategy,
            attempt_timeout: None,
        };
        policy.max_delay = policy.delay_for_attempt(max_retries.max(1));
        policy
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, RetryStrategy::Linear)
    }

    /// Cap every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Bound each attempt by `timeout`.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Delay before the given retry (1-indexed: attempt 1 is the first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = match self.strategy {
            RetryStrategy::Linear => u64::from(attempt.max(1)),
            RetryStrategy::ExponentialBackoff => 2u64.saturating_pow(attempt.saturating_sub(1)),
        };
        let millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(millis.saturating_mul(multiplier)).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or retries run out.
    ///
    /// Attempts are strictly sequential. Cancellation is checked before every
    /// attempt, the first one included: once `cancellation` fires no new
    /// attempt starts and [`BackendError::Cancelled`] is returned. An attempt
    /// already in flight is allowed to finish.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        cancellation: &CancellationToken,
        mut call: F,
    ) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0u32;

        loop {
            if cancellation.is_cancelled() {
                debug!(operation, attempt, "Cancelled, skipping backend call");
                return Err(BackendError::Cancelled {
                    operation: operation.to_string(),
                });
            }

            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, call()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(BackendError::Timeout {
                        operation: operation.to_string(),
                        after: limit,
                    }),
                },
                None => call().await,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, retries = attempt, "Backend call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }

            attempt += 1;
            let delay = self.delay_for_attempt(attempt);
            warn!(
                operation,
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Backend call failed, retrying"
            );

            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    debug!(operation, attempt, error = %error, "Cancelled during backoff");
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Run `operation`; on error hand the error to `on_failure`, whose result
/// replaces the operation's.
///
/// `on_failure` decides what to absorb: returning `Ok` substitutes a value,
/// returning `Err` re-raises.
pub async fn with_fallback<T, E, Fut, F>(operation: Fut, on_failure: F) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    F: FnOnce(E) -> Result<T, E>,
{
    match operation.await {
        Ok(value) => Ok(value),
        Err(error) => on_failure(error),
    }
}
