// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telemetry backend clients.
//!
//! Each diagnostic handler talks to exactly one of these services through a
//! constructor-injected client:
//! - `log_query`: the log/query service (VM creation, microcode update)
//! - `deployment`: the deployment-management service (deployment operations)
//! - `infra_session`: the infrastructure-session service (session changes)
//!
//! Only the interfaces live here; hosts provide the transports.

pub mod deployment;
pub mod infra_session;
pub mod log_query;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use deployment::{DeploymentClient, DeploymentOperation};
pub use infra_session::{InfraSession, InfraSessionClient, SessionChange};
pub use log_query::{LogQuery, LogQueryClient, LogRecord};

/// Closed time window a backend query is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Inclusive start.
    pub begin: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.begin
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.begin <= at && at <= self.end
    }
}
