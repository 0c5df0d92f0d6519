// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnosis dispatcher.
//!
//! Fans every outstanding request of a failed step out to every registered
//! handler and folds the per-pair results into one [`ExecutionResult`].
//!
//! The dispatcher is itself a reentrant operation. Its checkpoint is addressed
//! by the batch's request ids (see [`dispatcher_state_key`]) and carries the
//! step's shared deadline, computed on the first tick and reused by every
//! later one. Once the aggregate is completed, re-invocations of the same
//! batch replay it; a new batch in the same experiment starts fresh.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotriage_core::{
    CancellationToken, CheckpointState, CheckpointStore, ExecutionResult, ExecutionStatus,
    ReentrantOperation, Result, StateKey, TelemetryEvent, TelemetrySink, TriageConfig,
    TriageError,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::handler::diagnostics_key;
use crate::registry::HandlerRegistry;
use crate::request::DiagnosisRequest;

/// Telemetry name of the dispatcher.
pub const DISPATCHER_NAME: &str = "DiagnosisDispatcher";

/// Error recorded when the shared deadline elapses.
pub const TIMEOUT_ERROR: &str = "diagnosis timed out";

/// Checkpoint of the dispatcher for one experiment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherState {
    pub status: ExecutionStatus,
    /// Shared deadline, fixed on the first tick.
    pub step_timeout: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatcherState {
    pub fn new(step_timeout: DateTime<Utc>) -> Self {
        Self {
            status: ExecutionStatus::InProgress,
            step_timeout,
            error: None,
        }
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.step_timeout
    }
}

impl CheckpointState for DispatcherState {
    fn status(&self) -> ExecutionStatus {
        self.status
    }

    fn record(&mut self, result: &ExecutionResult) {
        self.status = result.status;
        self.error = result.error.clone();
    }

    fn replay(&self) -> ExecutionResult {
        let result = ExecutionResult::new(self.status);
        match &self.error {
            Some(error) => result.with_error(error.clone()),
            None => result,
        }
    }
}

/// Outstanding requests of one failed experiment step.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisBatch {
    experiment_id: String,
    requests: Vec<DiagnosisRequest>,
}

impl DiagnosisBatch {
    /// Create a batch. Every request must belong to `experiment_id` and
    /// request ids must be unique.
    pub fn new(experiment_id: impl Into<String>, requests: Vec<DiagnosisRequest>) -> Result<Self> {
        let experiment_id = experiment_id.into();
        if experiment_id.trim().is_empty() {
            return Err(TriageError::invalid_argument(
                "experimentId",
                "must not be empty",
            ));
        }

        let mut seen = HashSet::new();
        for request in &requests {
            if request.experiment_id() != experiment_id {
                return Err(TriageError::invalid_argument(
                    "requests",
                    format!(
                        "request '{}' belongs to experiment '{}', not '{}'",
                        request.id(),
                        request.experiment_id(),
                        experiment_id
                    ),
                ));
            }
            if !seen.insert(request.id()) {
                return Err(TriageError::invalid_argument(
                    "requests",
                    format!("duplicate request id '{}'", request.id()),
                ));
            }
        }

        Ok(Self {
            experiment_id,
            requests,
        })
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn requests(&self) -> &[DiagnosisRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Address of the dispatcher state for one batch.
///
/// The sub-id is built from the sorted request ids, so a single-request batch
/// is stored under `"{requestId}-diagnostics-state"` and re-ticks of the same
/// batch find the same deadline regardless of request order.
pub fn dispatcher_state_key(batch: &DiagnosisBatch) -> StateKey {
    let mut ids: Vec<&str> = batch.requests().iter().map(|request| request.id()).collect();
    ids.sort_unstable();
    StateKey::new(batch.experiment_id(), diagnostics_key(batch.experiment_id()))
        .with_sub_id(format!("{}-diagnostics-state", ids.join("+")))
}

/// Runs all (request, handler) pairs of a step and aggregates their results.
pub struct DiagnosisDispatcher {
    registry: HandlerRegistry,
    checkpoints: Arc<dyn CheckpointStore>,
    telemetry: Arc<dyn TelemetrySink>,
    timeout: Duration,
    max_concurrency: usize,
}

impl DiagnosisDispatcher {
    /// Create a dispatcher with the default deadline and concurrency.
    pub fn new(
        registry: HandlerRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::from_config(registry, checkpoints, telemetry, &TriageConfig::default())
    }

    pub fn from_config(
        registry: HandlerRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &TriageConfig,
    ) -> Self {
        Self {
            registry,
            checkpoints,
            telemetry,
            timeout: config.timeout,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Set the shared deadline applied from the first tick.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of pairs running at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one dispatcher tick for `batch`.
    pub async fn dispatch(
        &self,
        batch: &DiagnosisBatch,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if batch.is_empty() {
            // nothing to diagnose, and nothing worth a checkpoint
            debug!(experiment_id = %batch.experiment_id(), "No outstanding diagnosis requests");
            return Ok(ExecutionResult::succeeded());
        }

        let result = self.run(batch, cancellation).await?;
        info!(
            experiment_id = %batch.experiment_id(),
            status = %result.status,
            error = ?result.error,
            "Diagnosis dispatch finished"
        );
        Ok(result)
    }

    fn deadline_from_now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn correlation(&self, batch: &DiagnosisBatch, state: &DispatcherState) -> Map<String, Value> {
        let mut correlation = Map::new();
        correlation.insert(
            "experimentId".to_string(),
            Value::from(batch.experiment_id()),
        );
        correlation.insert(
            "requestIds".to_string(),
            Value::from(
                batch
                    .requests()
                    .iter()
                    .map(|request| request.id().to_string())
                    .collect::<Vec<_>>(),
            ),
        );
        correlation.insert(
            "stepTimeout".to_string(),
            Value::from(state.step_timeout.to_rfc3339()),
        );
        correlation
    }

    fn timed_out(&self, batch: &DiagnosisBatch, state: &DispatcherState) -> ExecutionResult {
        warn!(
            experiment_id = %batch.experiment_id(),
            step_timeout = %state.step_timeout,
            "Diagnosis deadline elapsed"
        );
        self.telemetry.emit(TelemetryEvent::error(
            format!("{}.Timeout", DISPATCHER_NAME),
            self.correlation(batch, state),
            TIMEOUT_ERROR,
        ));
        ExecutionResult::failed(TIMEOUT_ERROR)
    }
}

#[async_trait]
impl ReentrantOperation for DiagnosisDispatcher {
    type Request = DiagnosisBatch;
    type State = DispatcherState;

    fn operation_name(&self) -> &str {
        DISPATCHER_NAME
    }

    fn checkpoint_store(&self) -> &dyn CheckpointStore {
        self.checkpoints.as_ref()
    }

    fn state_key(&self, batch: &DiagnosisBatch) -> StateKey {
        dispatcher_state_key(batch)
    }

    fn initial_state(&self, _batch: &DiagnosisBatch) -> DispatcherState {
        DispatcherState::new(self.deadline_from_now())
    }

    async fn execute_tick(
        &self,
        batch: &DiagnosisBatch,
        state: &mut DispatcherState,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if batch.is_empty() {
            debug!(experiment_id = %batch.experiment_id(), "No outstanding diagnosis requests");
            return Ok(ExecutionResult::succeeded());
        }

        if state.is_expired(Utc::now()) {
            return Ok(self.timed_out(batch, state));
        }

        if cancellation.is_cancelled() {
            return Ok(ExecutionResult::cancelled());
        }

        let limiter = Arc::new(Semaphore::new(self.max_concurrency));
        let pairs_token = cancellation.child_token();
        let mut results = Vec::new();
        let mut tasks = Vec::new();

        for request in batch.requests() {
            for handler in self.registry.handlers() {
                if !handler.handles(request) {
                    debug!(
                        handler = handler.name(),
                        request_id = %request.id(),
                        "Handler not applicable"
                    );
                    results.push(ExecutionResult::succeeded());
                    continue;
                }

                let handler = Arc::clone(handler);
                let request = request.clone();
                let token = pairs_token.clone();
                let limiter = Arc::clone(&limiter);
                tasks.push(tokio::spawn(async move {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return Err(TriageError::Internal(format!(
                                "concurrency limiter closed: {}",
                                e
                            )));
                        }
                    };
                    handler.diagnose(&request, &token).await
                }));
            }
        }

        let mut correlation = self.correlation(batch, state);
        correlation.insert("scheduledPairs".to_string(), Value::from(tasks.len()));
        correlation.insert("skippedPairs".to_string(), Value::from(results.len()));
        self.telemetry.emit(TelemetryEvent::context(
            format!("{}.Dispatch", DISPATCHER_NAME),
            correlation,
        ));
        info!(
            experiment_id = %batch.experiment_id(),
            requests = batch.requests().len(),
            scheduled = tasks.len(),
            "Dispatching diagnosis"
        );

        let remaining = (state.step_timeout - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let joined = join_all(tasks);
        tokio::pin!(joined);

        let (outcomes, deadline_hit) = tokio::select! {
            outcomes = &mut joined => (outcomes, false),
            _ = tokio::time::sleep(remaining) => {
                // Pairs not yet started skip their backend call; running ones finish.
                pairs_token.cancel();
                (joined.await, true)
            }
        };

        let mut first_error = None;
        for outcome in outcomes {
            let error = match outcome {
                Ok(Ok(result)) => {
                    results.push(result);
                    continue;
                }
                Ok(Err(error)) => error,
                Err(join_error) => {
                    TriageError::Internal(format!("diagnosis task failed: {}", join_error))
                }
            };
            error!(
                experiment_id = %batch.experiment_id(),
                error = %error,
                "Diagnosis pair failed"
            );
            first_error.get_or_insert(error);
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if deadline_hit {
            return Ok(self.timed_out(batch, state));
        }
        if results.is_empty() {
            // no handlers registered
            return Ok(ExecutionResult::succeeded());
        }

        ExecutionResult::aggregate(&results)
    }
}
