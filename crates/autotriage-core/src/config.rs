// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::resilience::{RetryPolicy, RetryStrategy};

/// Auto-triage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageConfig {
    /// Shared dispatcher deadline, measured from the first invocation of a step.
    pub timeout: Duration,
    /// Retries per backend call after the first attempt.
    pub retry_attempts: u32,
    /// Backoff seed delay.
    pub retry_base_delay: Duration,
    /// Backoff cap.
    pub retry_max_delay: Duration,
    /// Backoff growth.
    pub retry_strategy: RetryStrategy,
    /// Timeout for one backend call attempt.
    pub backend_timeout: Duration,
    /// Maximum number of (request, handler) pairs running at once.
    pub max_concurrency: usize,
    /// Handler kinds to register (`None` = all).
    pub handlers: Option<Vec<String>>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1200),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(2000),
            retry_max_delay: Duration::from_millis(30_000),
            retry_strategy: RetryStrategy::Linear,
            backend_timeout: Duration::from_secs(60),
            max_concurrency: 16,
            handlers: None,
        }
    }
}

impl TriageConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `AUTOTRIAGE_TIMEOUT_SECS`: dispatcher deadline (default: 1200)
    /// - `AUTOTRIAGE_RETRY_ATTEMPTS`: retries per backend call (default: 3)
    /// - `AUTOTRIAGE_RETRY_BASE_DELAY_MS`: backoff seed (default: 2000)
    /// - `AUTOTRIAGE_RETRY_MAX_DELAY_MS`: backoff cap (default: 30000)
    /// - `AUTOTRIAGE_RETRY_STRATEGY`: `linear` or `exponential` (default: linear)
    /// - `AUTOTRIAGE_BACKEND_TIMEOUT_SECS`: per-attempt timeout (default: 60)
    /// - `AUTOTRIAGE_MAX_CONCURRENCY`: concurrent pairs (default: 16)
    /// - `AUTOTRIAGE_HANDLERS`: comma-separated handler kinds (default: all)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_secs: u64 = parse_var(
            "AUTOTRIAGE_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
            "must be a positive integer",
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "AUTOTRIAGE_TIMEOUT_SECS",
                "must be a positive integer",
            ));
        }

        let retry_attempts: u32 = parse_var(
            "AUTOTRIAGE_RETRY_ATTEMPTS",
            defaults.retry_attempts,
            "must be a non-negative integer",
        )?;

        let retry_base_delay_ms: u64 = parse_var(
            "AUTOTRIAGE_RETRY_BASE_DELAY_MS",
            millis(defaults.retry_base_delay),
            "must be a non-negative integer",
        )?;

        let retry_max_delay_ms: u64 = parse_var(
            "AUTOTRIAGE_RETRY_MAX_DELAY_MS",
            millis(defaults.retry_max_delay),
            "must be a non-negative integer",
        )?;

        let retry_strategy: RetryStrategy = parse_var(
            "AUTOTRIAGE_RETRY_STRATEGY",
            defaults.retry_strategy,
            "must be 'linear' or 'exponential'",
        )?;

        let backend_timeout_secs: u64 = parse_var(
            "AUTOTRIAGE_BACKEND_TIMEOUT_SECS",
            defaults.backend_timeout.as_secs(),
            "must be a positive integer",
        )?;

        let max_concurrency: usize = parse_var(
            "AUTOTRIAGE_MAX_CONCURRENCY",
            defaults.max_concurrency,
            "must be a positive integer",
        )?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "AUTOTRIAGE_MAX_CONCURRENCY",
                "must be a positive integer",
            ));
        }

        let handlers = env::var("AUTOTRIAGE_HANDLERS").ok().and_then(|raw| {
            let names: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            (!names.is_empty()).then_some(names)
        });

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            retry_attempts,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(retry_max_delay_ms),
            retry_strategy,
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            max_concurrency,
            handlers,
        })
    }

    /// Set the dispatcher deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retries per backend call.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the backoff seed delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the backoff cap.
    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    /// Set the backoff growth strategy.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Set the timeout for one backend call attempt.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrently running pairs.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Restrict registration to the named handler kinds.
    pub fn with_handlers<I, S>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handlers = Some(handlers.into_iter().map(Into::into).collect());
        self
    }

    /// Retry policy applied to every backend call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            strategy: self.retry_strategy,
            attempt_timeout: Some(self.backend_timeout),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T: FromStr>(
    name: &'static str,
    default: T,
    message: &'static str,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, message)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// A handler kind that is not known to the registry.
    #[error("unknown handler kind '{0}'")]
    UnknownHandler(String),
}
