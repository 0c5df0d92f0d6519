// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnostic handler contract and the checkpointed handler implementation.
//!
//! A concrete handler only describes *what* to collect by implementing
//! [`DiagnosticsProvider`]. [`ProviderHandler`] wraps it in the reentrant
//! contract:
//!
//! 1. load the per-(request, handler) [`HandlerState`], short-circuit if completed
//! 2. reject requests the provider's predicate does not accept
//! 3. emit `<Handler>.Diagnose`, then collect under retry and fallback
//! 4. emit `<Handler>.DiagnosticsResults` for any entries found
//! 5. persist the state as succeeded
//!
//! Backend failures that survive the retries are absorbed: they are logged,
//! emitted as `<Handler>.Diagnose.Error`, and the handler reports success with
//! no evidence. Contract violations are re-raised. A backend call skipped
//! because of cancellation ends the tick as cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use autotriage_core::{
    CancellationToken, CheckpointState, CheckpointStore, DiagnosticsEntry, ExecutionResult,
    ExecutionStatus, ReentrantOperation, Result, RetryPolicy, StateKey, TelemetryEvent,
    TelemetrySink, TriageError, with_fallback,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::request::{DiagnosisRequest, IssueType};

/// Checkpoint persisted per (request, handler) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerState {
    pub status: ExecutionStatus,
    pub is_terminal: bool,
}

impl HandlerState {
    /// State of a pair that has not run yet.
    pub fn new() -> Self {
        Self::with_status(ExecutionStatus::InProgress)
    }

    /// State with `status`, deriving the terminal flag.
    pub fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            is_terminal: status.is_terminal(),
        }
    }
}

impl Default for HandlerState {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointState for HandlerState {
    fn status(&self) -> ExecutionStatus {
        self.status
    }

    fn record(&mut self, result: &ExecutionResult) {
        *self = Self::with_status(result.status);
    }
}

/// Checkpoint key shared by everything diagnosing one experiment.
pub fn diagnostics_key(experiment_id: &str) -> String {
    format!("{}-diagnostics", experiment_id)
}

/// Address of the state one handler keeps for one request.
pub fn handler_state_key(request: &DiagnosisRequest, handler_name: &str) -> StateKey {
    StateKey::new(request.experiment_id(), diagnostics_key(request.experiment_id()))
        .with_sub_id(format!("{}-{}-diagnostics-state", request.id(), handler_name))
}

/// A handler the dispatcher can fan requests out to.
#[async_trait]
pub trait DiagnosticHandler: Send + Sync {
    /// Unique name, also the prefix of the handler's telemetry events.
    fn name(&self) -> &str;

    /// Whether this handler applies to `request`. Pure, no I/O.
    fn handles(&self, request: &DiagnosisRequest) -> bool;

    /// Run one reentrant diagnosis tick for `request`.
    async fn diagnose(
        &self,
        request: &DiagnosisRequest,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult>;
}

/// What a concrete handler collects and when it applies.
#[async_trait]
pub trait DiagnosticsProvider: Send + Sync {
    /// Handler name, e.g. `VmCreationDiagnostics`.
    fn name(&self) -> &'static str;

    /// Issue types the provider understands.
    fn issue_types(&self) -> &'static [IssueType];

    /// Context keys that must be present.
    fn required_context(&self) -> &'static [&'static str];

    /// Predicate over the request's issue type and context keys.
    fn handles(&self, request: &DiagnosisRequest) -> bool {
        self.issue_types().contains(&request.issue_type())
            && self
                .required_context()
                .iter()
                .all(|key| request.has_context(key))
    }

    /// Query the backend and map its records into entries.
    ///
    /// Every backend call should go through `retry`. Backend errors surviving
    /// the retries are returned as [`TriageError::Backend`].
    async fn collect(
        &self,
        request: &DiagnosisRequest,
        retry: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> Result<Vec<DiagnosticsEntry>>;
}

/// Collaborators shared by all handlers.
#[derive(Clone)]
pub struct HandlerServices {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub retry: RetryPolicy,
}

impl HandlerServices {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        telemetry: Arc<dyn TelemetrySink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            checkpoints,
            telemetry,
            retry,
        }
    }
}

/// A [`DiagnosticsProvider`] run under the reentrant contract.
pub struct ProviderHandler<P> {
    provider: P,
    services: HandlerServices,
}

impl<P: DiagnosticsProvider> ProviderHandler<P> {
    pub fn new(provider: P, services: HandlerServices) -> Self {
        Self { provider, services }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn correlation(&self, request: &DiagnosisRequest) -> serde_json::Map<String, Value> {
        let mut correlation = request.correlation();
        correlation.insert("handler".to_string(), Value::from(self.provider.name()));
        correlation
    }

    fn check_applies(&self, request: &DiagnosisRequest) -> Result<()> {
        if !self.provider.issue_types().contains(&request.issue_type()) {
            return Err(TriageError::invalid_argument(
                "issueType",
                format!(
                    "{} does not handle '{}' (request '{}')",
                    self.provider.name(),
                    request.issue_type(),
                    request.id()
                ),
            ));
        }
        request.ensure_context(self.provider.required_context())
    }
}

#[async_trait]
impl<P: DiagnosticsProvider> ReentrantOperation for ProviderHandler<P> {
    type Request = DiagnosisRequest;
    type State = HandlerState;

    fn operation_name(&self) -> &str {
        self.provider.name()
    }

    fn checkpoint_store(&self) -> &dyn CheckpointStore {
        self.services.checkpoints.as_ref()
    }

    fn state_key(&self, request: &DiagnosisRequest) -> StateKey {
        handler_state_key(request, self.provider.name())
    }

    fn initial_state(&self, _request: &DiagnosisRequest) -> HandlerState {
        HandlerState::new()
    }

    async fn execute_tick(
        &self,
        request: &DiagnosisRequest,
        _state: &mut HandlerState,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let name = self.provider.name();
        self.check_applies(request)?;

        if cancellation.is_cancelled() {
            debug!(handler = name, request_id = %request.id(), "Cancelled before diagnosis");
            return Ok(ExecutionResult::cancelled());
        }

        let correlation = self.correlation(request);
        info!(
            handler = name,
            experiment_id = %request.experiment_id(),
            request_id = %request.id(),
            issue_type = %request.issue_type(),
            "Running diagnosis"
        );
        self.services.telemetry.emit(TelemetryEvent::context(
            format!("{}.Diagnose", name),
            correlation.clone(),
        ));

        let collected = with_fallback(
            self.provider
                .collect(request, &self.services.retry, cancellation),
            |error| {
                if error.is_contract_violation() || error.is_cancellation() {
                    return Err(error);
                }
                warn!(
                    handler = name,
                    request_id = %request.id(),
                    error = %error,
                    "Diagnosis failed, continuing without evidence"
                );
                self.services.telemetry.emit(TelemetryEvent::error(
                    format!("{}.Diagnose.Error", name),
                    correlation.clone(),
                    error.to_string(),
                ));
                Ok(Vec::new())
            },
        )
        .await;

        let entries = match collected {
            Ok(entries) => entries,
            Err(error) if error.is_cancellation() => {
                debug!(
                    handler = name,
                    request_id = %request.id(),
                    error = %error,
                    "Cancelled between backend calls"
                );
                return Ok(ExecutionResult::cancelled());
            }
            Err(error) => return Err(error),
        };

        if !entries.is_empty() {
            info!(
                handler = name,
                request_id = %request.id(),
                entries = entries.len(),
                "Diagnostics collected"
            );
            self.services.telemetry.emit(TelemetryEvent::entries(
                format!("{}.DiagnosticsResults", name),
                correlation,
                entries,
            ));
        }

        Ok(ExecutionResult::succeeded())
    }
}

#[async_trait]
impl<P: DiagnosticsProvider> DiagnosticHandler for ProviderHandler<P> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn handles(&self, request: &DiagnosisRequest) -> bool {
        self.provider.handles(request)
    }

    async fn diagnose(
        &self,
        request: &DiagnosisRequest,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.run(request, cancellation).await
    }
}
