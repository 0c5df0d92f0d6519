// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution status taxonomy and the algebra over one-or-more results.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// Delay handed back to the caller when no result requests an extension.
pub const DEFAULT_EXTENSION: Duration = Duration::from_secs(1);

/// Status of a reentrant operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// Not started yet
    #[default]
    Pending,
    /// Work is underway
    InProgress,
    /// Work is underway and the operation asked to be called again promptly
    InProgressContinue,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Cancelled by the caller
    Cancelled,
    /// Cancelled by the platform
    SystemCancelled,
}

/// Statuses from which no further progress is expected, success included.
pub const COMPLETED_STATUSES: [ExecutionStatus; 4] = [
    ExecutionStatus::Succeeded,
    ExecutionStatus::Failed,
    ExecutionStatus::Cancelled,
    ExecutionStatus::SystemCancelled,
];

/// Completed statuses that are not success.
pub const TERMINAL_STATUSES: [ExecutionStatus; 3] = [
    ExecutionStatus::Failed,
    ExecutionStatus::Cancelled,
    ExecutionStatus::SystemCancelled,
];

/// Statuses that mean "call me again later".
pub const NON_COMPLETED_STATUSES: [ExecutionStatus; 3] = [
    ExecutionStatus::Pending,
    ExecutionStatus::InProgress,
    ExecutionStatus::InProgressContinue,
];

impl ExecutionStatus {
    /// Every status, in declaration order.
    pub const ALL: [ExecutionStatus; 7] = [
        ExecutionStatus::Pending,
        ExecutionStatus::InProgress,
        ExecutionStatus::InProgressContinue,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
        ExecutionStatus::SystemCancelled,
    ];

    /// True for succeeded, failed, cancelled and system-cancelled.
    pub fn is_completed(self) -> bool {
        COMPLETED_STATUSES.contains(&self)
    }

    /// True for failed, cancelled and system-cancelled.
    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::InProgress => "in-progress",
            ExecutionStatus::InProgressContinue => "in-progress-continue",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::SystemCancelled => "system-cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TriageError::invalid_argument("status", format!("unknown status '{}'", s)))
    }
}

/// Outcome of one invocation of a reentrant operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Resulting status
    pub status: ExecutionStatus,
    /// Error description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How long the caller should wait before invoking again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Duration>,
}

impl ExecutionResult {
    /// Create a result with the given status and nothing else.
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            error: None,
            extension: None,
        }
    }

    /// A succeeded result.
    pub fn succeeded() -> Self {
        Self::new(ExecutionStatus::Succeeded)
    }

    /// An in-progress result.
    pub fn in_progress() -> Self {
        Self::new(ExecutionStatus::InProgress)
    }

    /// A cancelled result.
    pub fn cancelled() -> Self {
        Self::new(ExecutionStatus::Cancelled)
    }

    /// A failed result carrying an error description.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(ExecutionStatus::Failed).with_error(error)
    }

    /// Attach an error description.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Request a delay before the next invocation.
    pub fn with_extension(mut self, extension: Duration) -> Self {
        self.extension = Some(extension);
        self
    }

    /// See [`ExecutionStatus::is_completed`].
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// See [`ExecutionStatus::is_terminal`].
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge the results of independently progressing sub-operations.
    ///
    /// - any terminal result makes the aggregate terminal (`failed` wins over
    ///   the cancelled statuses) and every error is carried along;
    /// - otherwise any non-completed result makes the aggregate in-progress,
    ///   with the extension chosen by [`combine_extension`];
    /// - otherwise the aggregate succeeded.
    ///
    /// An empty slice is a contract violation.
    pub fn aggregate(results: &[ExecutionResult]) -> Result<ExecutionResult> {
        if results.is_empty() {
            return Err(TriageError::invalid_argument(
                "results",
                "cannot aggregate an empty result set",
            ));
        }

        let terminal = if results
            .iter()
            .any(|r| r.status == ExecutionStatus::Failed)
        {
            Some(ExecutionStatus::Failed)
        } else {
            results.iter().map(|r| r.status).find(|s| s.is_terminal())
        };

        if let Some(status) = terminal {
            let errors: Vec<&str> = results.iter().filter_map(|r| r.error.as_deref()).collect();
            let mut aggregate = ExecutionResult::new(status);
            if !errors.is_empty() {
                aggregate.error = Some(errors.join("; "));
            }
            return Ok(aggregate);
        }

        if results.iter().any(|r| !r.is_completed()) {
            return Ok(ExecutionResult::in_progress().with_extension(combine_extension(results)?));
        }

        Ok(ExecutionResult::succeeded())
    }
}

/// Pick the delay before the next reentrant invocation.
///
/// Returns the largest extension requested by any result, or
/// [`DEFAULT_EXTENSION`] when none asks for one. Fails fast on an empty slice.
pub fn combine_extension(results: &[ExecutionResult]) -> Result<Duration> {
    if results.is_empty() {
        return Err(TriageError::invalid_argument(
            "results",
            "at least one result is required to combine extensions",
        ));
    }

    Ok(results
        .iter()
        .filter_map(|r| r.extension)
        .max()
        .unwrap_or(DEFAULT_EXTENSION))
}
