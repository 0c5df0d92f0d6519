// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telemetry sink and tracing subscriber initialization.
//!
//! The sink is the only externally visible output of a diagnosis: handlers emit
//! correlation events when they start, the entries they found, and the errors
//! their fallback absorbed.
//!
//! # Event names
//!
//! - `<Handler>.Diagnose`: correlation context at the start of a diagnosis
//! - `<Handler>.DiagnosticsResults`: entries produced by a successful query
//! - `<Handler>.Diagnose.Error`: a backend failure absorbed by the fallback

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::entry::DiagnosticsEntry;

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Correlation context for causal tracing.
    Context {
        /// Correlation fields.
        correlation: Map<String, Value>,
    },
    /// Findings produced by a diagnosis.
    Entries {
        /// Correlation fields.
        correlation: Map<String, Value>,
        /// Produced entries.
        entries: Vec<DiagnosticsEntry>,
    },
    /// A handled, non-fatal error.
    Error {
        /// Correlation fields.
        correlation: Map<String, Value>,
        /// Error description.
        error: String,
    },
}

/// One named telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `VmCreationDiagnostics.Diagnose`.
    pub name: String,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub payload: EventPayload,
}

impl TelemetryEvent {
    fn new(name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A correlation-context event.
    pub fn context(name: impl Into<String>, correlation: Map<String, Value>) -> Self {
        Self::new(name, EventPayload::Context { correlation })
    }

    /// An event carrying produced entries.
    pub fn entries(
        name: impl Into<String>,
        correlation: Map<String, Value>,
        entries: Vec<DiagnosticsEntry>,
    ) -> Self {
        Self::new(
            name,
            EventPayload::Entries {
                correlation,
                entries,
            },
        )
    }

    /// A handled-error event.
    pub fn error(
        name: impl Into<String>,
        correlation: Map<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            EventPayload::Error {
                correlation,
                error: error.into(),
            },
        )
    }

    /// Correlation fields of the event.
    pub fn correlation(&self) -> &Map<String, Value> {
        match &self.payload {
            EventPayload::Context { correlation }
            | EventPayload::Entries { correlation, .. }
            | EventPayload::Error { correlation, .. } => correlation,
        }
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record an event. Must not fail or block for long.
    fn emit(&self, event: TelemetryEvent);
}

/// Sink writing every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        let payload = serde_json::to_string(&event.payload)
            .unwrap_or_else(|e| format!("{{\"serialization_error\":\"{}\"}}", e));

        match &event.payload {
            EventPayload::Error { error, .. } => warn!(
                target: "autotriage::telemetry",
                event = %event.name,
                error = %error,
                payload = %payload,
                "Handled diagnostics error"
            ),
            EventPayload::Entries { entries, .. } => info!(
                target: "autotriage::telemetry",
                event = %event.name,
                entries = entries.len(),
                payload = %payload,
                "Diagnostics results"
            ),
            EventPayload::Context { .. } => info!(
                target: "autotriage::telemetry",
                event = %event.name,
                payload = %payload,
                "Diagnostics event"
            ),
        }
    }
}

/// Sink capturing events in memory.
#[derive(Debug, Default)]
pub struct InMemoryTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl InMemoryTelemetrySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events, in emission order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Captured events with the given name.
    pub fn events_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }

    /// Number of captured events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events_named(name).len()
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Initialize the global tracing subscriber.
///
/// Sets up a stderr `fmt` layer and an `EnvFilter` that respects `RUST_LOG`
/// (default: `info`). Call once from the host process; fails if a global
/// subscriber is already installed.
pub fn init_subscriber() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    use tracing_subscriber::layer::SubscriberExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let subscriber = tracing_subscriber::Registry::default()
        .with(fmt)
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)
}
