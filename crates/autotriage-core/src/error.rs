// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the auto-triage engine.
//!
//! - [`BackendError`]: retried, then absorbed by a handler's fallback.
//! - [`CheckpointError`]: always propagates to the step orchestrator.
//! - Contract violations ([`TriageError::is_contract_violation`]): fail fast.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type using [`TriageError`].
pub type Result<T> = std::result::Result<T, TriageError>;

/// Failure talking to a telemetry backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Backend could not be reached or answered with a server-side error.
    #[error("{backend} unavailable: {message}")]
    Unavailable {
        /// Backend name.
        backend: String,
        /// Error details.
        message: String,
    },

    /// Backend rejected the caller's credentials.
    #[error("{backend} rejected credentials: {message}")]
    Unauthorized {
        /// Backend name.
        backend: String,
        /// Error details.
        message: String,
    },

    /// Backend accepted the call but the query failed.
    #[error("{backend} query failed: {message}")]
    Query {
        /// Backend name.
        backend: String,
        /// Error details.
        message: String,
    },

    /// The requested record does not exist on the backend.
    #[error("{backend} has no record of {what}")]
    NotFound {
        /// Backend name.
        backend: String,
        /// What was looked up.
        what: String,
    },

    /// A single attempt exceeded the per-call timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Configured per-attempt timeout.
        after: Duration,
    },

    /// Cancellation was observed before the call started.
    #[error("{operation} cancelled before the call started")]
    Cancelled {
        /// Operation that was skipped.
        operation: String,
    },
}

impl BackendError {
    /// Shorthand for [`BackendError::Unavailable`].
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`BackendError::Query`].
    pub fn query(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`BackendError::NotFound`].
    pub fn not_found(backend: impl Into<String>, what: impl Into<String>) -> Self {
        Self::NotFound {
            backend: backend.into(),
            what: what.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Credential and not-found errors are permanent for the lifetime of a call.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Unauthorized { .. } | Self::NotFound { .. } | Self::Cancelled { .. }
        )
    }

    /// Whether the call was skipped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Failure loading or saving checkpoint state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointError {
    /// The underlying store failed.
    #[error("checkpoint storage error during '{operation}': {details}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// State could not be converted to or from its persisted form.
    #[error("checkpoint state at '{key}' is not valid: {source}")]
    Serialization {
        /// Display form of the state key.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CheckpointError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CheckpointError::Storage {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

/// Errors surfaced by the triage engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TriageError {
    /// A caller passed an argument that breaks the operation's contract.
    #[error("invalid argument '{argument}': {message}")]
    InvalidArgument {
        /// Argument name.
        argument: String,
        /// What is wrong with it.
        message: String,
    },

    /// A handler was invoked with a request lacking a context key its predicate requires.
    #[error("request '{request_id}' is missing required context key '{key}'")]
    MissingContext {
        /// Request identifier.
        request_id: String,
        /// Missing key.
        key: String,
    },

    /// Checkpoint store failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Telemetry backend failure that was not absorbed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A bug inside the engine (e.g. a panicked task).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TriageError {
    /// Shorthand for [`TriageError::InvalidArgument`].
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Get the stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::MissingContext { .. } => "MISSING_CONTEXT",
            Self::Checkpoint(_) => "CHECKPOINT_ERROR",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// A backend call skipped because the pair was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Backend(error) if error.is_cancelled())
    }

    /// Programming and contract errors. These indicate a dispatch bug and must
    /// never be swallowed by a fallback.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::MissingContext { .. } | Self::Internal(_)
        )
    }
}
