// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Autotriage core - building blocks for reentrant, checkpointed diagnostics.
//!
//! This crate provides the pieces every auto-triage component is built from:
//!
//! - **Result model**: [`ExecutionStatus`] with its completed / terminal
//!   classification, [`ExecutionResult`] and [`combine_extension`]
//! - **Reentrant operations**: [`ReentrantOperation`] and [`run_tick`], the
//!   load → short-circuit → work → persist contract
//! - **Checkpoints**: the [`CheckpointStore`] interface with in-memory and
//!   SQLite implementations, and typed helpers in [`CheckpointStoreExt`]
//! - **Resilience**: [`RetryPolicy`] and [`with_fallback`] for backend calls
//! - **Telemetry**: the [`TelemetrySink`] event channel and subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use autotriage_core::{CheckpointStoreExt, InMemoryCheckpointStore, StateKey};
//!
//! let store = InMemoryCheckpointStore::new();
//! let key = StateKey::new("exp-1", "exp-1-diagnostics").with_sub_id("req-1-diagnostics-state");
//!
//! let mut state: MyState = store.get_or_create(&key).await?;
//! // ... one unit of work ...
//! store.save_state(&key, &state).await?;
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `AUTOTRIAGE_TIMEOUT_SECS` | `1200` | Dispatcher deadline |
//! | `AUTOTRIAGE_RETRY_ATTEMPTS` | `3` | Retries per backend call |
//! | `AUTOTRIAGE_RETRY_BASE_DELAY_MS` | `2000` | Backoff seed |
//! | `AUTOTRIAGE_RETRY_MAX_DELAY_MS` | `30000` | Backoff cap |
//! | `AUTOTRIAGE_RETRY_STRATEGY` | `linear` | `linear` or `exponential` |
//! | `AUTOTRIAGE_BACKEND_TIMEOUT_SECS` | `60` | Per-attempt backend timeout |
//! | `AUTOTRIAGE_MAX_CONCURRENCY` | `16` | Concurrent (request, handler) pairs |
//! | `AUTOTRIAGE_HANDLERS` | all | Handler kinds to register |

pub mod checkpoint;
pub mod config;
pub mod entry;
pub mod error;
pub mod operation;
pub mod resilience;
pub mod result;
pub mod telemetry;

pub use checkpoint::{
    CheckpointStore, CheckpointStoreExt, InMemoryCheckpointStore, SqliteCheckpointStore, StateKey,
};
pub use config::{ConfigError, TriageConfig};
pub use entry::DiagnosticsEntry;
pub use error::{BackendError, CheckpointError, Result, TriageError};
pub use operation::{CheckpointState, ReentrantOperation, run_tick};
pub use resilience::{RetryPolicy, RetryStrategy, with_fallback};
pub use result::{
    COMPLETED_STATUSES, DEFAULT_EXTENSION, ExecutionResult, ExecutionStatus,
    NON_COMPLETED_STATUSES, TERMINAL_STATUSES, combine_extension,
};
pub use telemetry::{
    EventPayload, InMemoryTelemetrySink, TelemetryEvent, TelemetrySink, TracingTelemetrySink,
    init_subscriber,
};

// Re-exported so callers share one cancellation type with the engine.
pub use tokio_util::sync::CancellationToken;
