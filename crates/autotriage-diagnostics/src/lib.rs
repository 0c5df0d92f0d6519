// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Autotriage diagnostics - handlers and the dispatcher that fans failed
//! experiment steps out to them.
//!
//! # Architecture
//!
//! ```text
//! failed step
//!     │ DiagnosisBatch
//!     ▼
//! DiagnosisDispatcher ── checkpoint: step deadline
//!     │ requests × handlers
//!     ├── not applicable ──────────────► succeeded
//!     └── tokio task per matching pair
//!             ▼
//!         ProviderHandler ── checkpoint: HandlerState
//!             │ retry + fallback
//!             ▼
//!         telemetry backend ──► TelemetrySink events
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use autotriage_core::{InMemoryCheckpointStore, TracingTelemetrySink, TriageConfig};
//! use autotriage_diagnostics::{
//!     BackendClients, DiagnosisBatch, DiagnosisDispatcher, HandlerFactory, HandlerServices,
//! };
//!
//! let config = TriageConfig::from_env()?;
//! let checkpoints = Arc::new(InMemoryCheckpointStore::new());
//! let telemetry = Arc::new(TracingTelemetrySink);
//! let services = HandlerServices::new(checkpoints.clone(), telemetry.clone(), config.retry_policy());
//!
//! let clients = BackendClients::default().with_log_query(my_log_client);
//! let registry = HandlerFactory::new(clients, services).build_registry(&config)?;
//! let dispatcher = DiagnosisDispatcher::from_config(registry, checkpoints, telemetry, &config);
//!
//! let batch = DiagnosisBatch::new("exp-1", pending_requests)?;
//! let result = dispatcher.dispatch(&batch, &cancellation).await?;
//! ```

pub mod backends;
pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod request;

pub use backends::{
    DeploymentClient, DeploymentOperation, InfraSession, InfraSessionClient, LogQuery,
    LogQueryClient, LogRecord, SessionChange, TimeWindow,
};
pub use dispatcher::{
    DiagnosisBatch, DiagnosisDispatcher, DispatcherState, TIMEOUT_ERROR, dispatcher_state_key,
};
pub use handler::{
    DiagnosticHandler, DiagnosticsProvider, HandlerServices, HandlerState, ProviderHandler,
    diagnostics_key, handler_state_key,
};
pub use handlers::{
    DeploymentOperationsDiagnostics, InfraSessionDeploymentDiagnostics,
    MicrocodeUpdateDiagnostics, VmCreationDiagnostics,
};
pub use registry::{BackendClients, HandlerFactory, HandlerKind, HandlerRegistry};
pub use request::{DiagnosisRequest, DiagnosisRequestBuilder, IssueType, context_keys};
