// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for autotriage-diagnostics tests.
//!
//! Fake backends count their calls so idempotence and fault isolation can be
//! asserted exactly.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autotriage_core::{
    BackendError, CheckpointError, CheckpointStore, InMemoryCheckpointStore,
    InMemoryTelemetrySink, RetryPolicy, RetryStrategy, StateKey,
};
use autotriage_diagnostics::{
    BackendClients, DeploymentClient, DeploymentOperation, DiagnosisRequest, HandlerFactory,
    HandlerKind, HandlerRegistry, HandlerServices, InfraSession, InfraSessionClient, IssueType,
    LogQuery, LogQueryClient, LogRecord, SessionChange, TimeWindow, context_keys,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

pub const EXPERIMENT: &str = "exp-42";

pub fn window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

pub fn window_end() -> DateTime<Utc> {
    window_start() + chrono::Duration::hours(2)
}

pub fn vm_request(id: &str) -> DiagnosisRequest {
    DiagnosisRequest::builder(EXPERIMENT, IssueType::VmCreationFailure)
        .id(id)
        .time_range(window_start(), window_end())
        .context(context_keys::SUBSCRIPTION_ID, "sub-1")
        .context(context_keys::RESOURCE_GROUP_NAME, "rg-exp-42")
        .build()
        .unwrap()
}

pub fn microcode_request(id: &str) -> DiagnosisRequest {
    DiagnosisRequest::builder(EXPERIMENT, IssueType::MicrocodeUpdateFailure)
        .id(id)
        .time_range(window_start(), window_end())
        .context(context_keys::TIP_NODE_ID, "node-7")
        .build()
        .unwrap()
}

pub fn infra_request(id: &str) -> DiagnosisRequest {
    DiagnosisRequest::builder(EXPERIMENT, IssueType::InfrastructureSessionDeploymentFailure)
        .id(id)
        .time_range(window_start(), window_end())
        .context(context_keys::TIP_SESSION_ID, "session-1")
        .context(context_keys::TIP_SESSION_CHANGE_ID, "change-9")
        .build()
        .unwrap()
}

/// Short backoff so retry tests stay fast under a paused clock.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10), RetryStrategy::Linear)
}

/// Tracks how many calls are in flight across several fakes.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Shared behavior of the fake backends.
#[derive(Debug, Default)]
struct Script {
    calls: AtomicU32,
    error: Option<BackendError>,
    delay: Option<Duration>,
    gauge: Option<Arc<Gauge>>,
}

impl Script {
    async fn call(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Log/query fake returning fixed rows.
#[derive(Debug, Default)]
pub struct FakeLogQuery {
    script: Script,
    rows: Vec<LogRecord>,
    queries: Mutex<Vec<LogQuery>>,
}

impl FakeLogQuery {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            script: Script {
                error: Some(error),
                ..Script::default()
            },
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn gauged(mut self, gauge: Arc<Gauge>) -> Self {
        self.script.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogQueryClient for FakeLogQuery {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, BackendError> {
        self.queries.lock().unwrap().push(query.clone());
        self.script.call().await?;
        Ok(self.rows.clone())
    }
}

/// Deployment fake returning fixed operations.
#[derive(Debug, Default)]
pub struct FakeDeployments {
    script: Script,
    operations: Vec<DeploymentOperation>,
}

impl FakeDeployments {
    pub fn with_operations(operations: Vec<DeploymentOperation>) -> Self {
        Self {
            operations,
            ..Self::default()
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            script: Script {
                error: Some(error),
                ..Script::default()
            },
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentClient for FakeDeployments {
    async fn list_operations(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        _window: &TimeWindow,
    ) -> Result<Vec<DeploymentOperation>, BackendError> {
        self.script.call().await?;
        Ok(self.operations.clone())
    }
}

/// Infrastructure-session fake with one session and one change.
#[derive(Debug, Default)]
pub struct FakeInfraSessions {
    script: Script,
}

impl FakeInfraSessions {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            script: Script {
                error: Some(error),
                ..Script::default()
            },
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn gauged(mut self, gauge: Arc<Gauge>) -> Self {
        self.script.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InfraSessionClient for FakeInfraSessions {
    async fn get_session(&self, session_id: &str) -> Result<InfraSession, BackendError> {
        self.script.call().await?;
        Ok(InfraSession {
            id: session_id.to_string(),
            state: "Active".to_string(),
            node_ids: vec!["node-7".to_string(), "node-8".to_string()],
            created_at: Some(window_start()),
        })
    }

    async fn get_session_change(
        &self,
        session_id: &str,
        change_id: &str,
    ) -> Result<SessionChange, BackendError> {
        self.script.call().await?;
        Ok(SessionChange {
            id: change_id.to_string(),
            session_id: session_id.to_string(),
            status: "Failed".to_string(),
            change_type: Some("HostOsUpdate".to_string()),
            error_message: Some("node node-7 did not come back".to_string()),
            started_at: Some(window_start()),
            completed_at: None,
        })
    }
}

/// Checkpoint store whose every call fails.
#[derive(Debug, Default)]
pub struct FailingCheckpointStore;

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    fn store_type(&self) -> &'static str {
        "failing"
    }

    async fn load(&self, _key: &StateKey) -> Result<Option<Value>, CheckpointError> {
        Err(CheckpointError::Storage {
            operation: "load".to_string(),
            details: "connection refused".to_string(),
        })
    }

    async fn save(&self, _key: &StateKey, _state: Value) -> Result<(), CheckpointError> {
        Err(CheckpointError::Storage {
            operation: "save".to_string(),
            details: "connection refused".to_string(),
        })
    }
}

pub fn failed_operation(name: &str, at: DateTime<Utc>) -> DeploymentOperation {
    DeploymentOperation {
        deployment_name: name.to_string(),
        operation_id: format!("{}-op", name),
        provisioning_state: "Failed".to_string(),
        resource_type: Some("Microsoft.Compute/virtualMachines".to_string()),
        resource_name: Some("vm-0".to_string()),
        status_code: Some("AllocationFailed".to_string()),
        status_message: Some("no capacity".to_string()),
        timestamp: at,
    }
}

pub fn log_row(message: &str) -> Value {
    json!({
        "PreciseTimeStamp": "2025-06-01T08:15:00Z",
        "Result": "Failed",
        "ErrorMessage": message,
    })
}

/// In-memory store, capturing sink and the fakes behind one registry.
pub struct TestContext {
    pub store: Arc<InMemoryCheckpointStore>,
    pub telemetry: Arc<InMemoryTelemetrySink>,
    pub log_query: Arc<FakeLogQuery>,
    pub deployments: Arc<FakeDeployments>,
    pub infra_sessions: Arc<FakeInfraSessions>,
}

impl TestContext {
    pub fn new(
        log_query: FakeLogQuery,
        deployments: FakeDeployments,
        infra_sessions: FakeInfraSessions,
    ) -> Self {
        Self {
            store: Arc::new(InMemoryCheckpointStore::new()),
            telemetry: Arc::new(InMemoryTelemetrySink::new()),
            log_query: Arc::new(log_query),
            deployments: Arc::new(deployments),
            infra_sessions: Arc::new(infra_sessions),
        }
    }

    pub fn healthy() -> Self {
        Self::new(
            FakeLogQuery::with_rows(vec![log_row("allocation failed")]),
            FakeDeployments::with_operations(vec![failed_operation(
                "vm-deploy",
                window_start() + chrono::Duration::minutes(5),
            )]),
            FakeInfraSessions::healthy(),
        )
    }

    pub fn services(&self) -> HandlerServices {
        HandlerServices::new(self.store.clone(), self.telemetry.clone(), fast_retry())
    }

    pub fn clients(&self) -> BackendClients {
        BackendClients::default()
            .with_log_query(self.log_query.clone())
            .with_deployments(self.deployments.clone())
            .with_infra_sessions(self.infra_sessions.clone())
    }

    pub fn factory(&self) -> HandlerFactory {
        HandlerFactory::new(self.clients(), self.services())
    }

    /// Registry holding exactly `kinds`, in order.
    pub fn registry(&self, kinds: &[HandlerKind]) -> HandlerRegistry {
        let factory = self.factory();
        let mut registry = HandlerRegistry::new();
        for kind in kinds {
            registry
                .register(factory.create(*kind).expect("all clients configured"))
                .unwrap();
        }
        registry
    }

    pub fn backend_calls(&self) -> u32 {
        self.log_query.calls() + self.deployments.calls() + self.infra_sessions.calls()
    }
}
