// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Log/query service client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use autotriage_core::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::TimeWindow;

/// One row returned by the log/query service.
pub type LogRecord = Map<String, Value>;

/// A parameterized query against one log database.
///
/// Parameters are bound by the service, never spliced into `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Database (cluster/table namespace) to run against.
    pub database: String,
    /// Query text referencing parameters by name.
    pub text: String,
    /// Named parameter values.
    pub parameters: BTreeMap<String, String>,
    /// Window restricting the rows returned.
    pub window: TimeWindow,
}

impl LogQuery {
    /// Create a query without parameters.
    pub fn new(database: impl Into<String>, text: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            database: database.into(),
            text: text.into(),
            parameters: BTreeMap::new(),
            window,
        }
    }

    /// Bind a named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Client for the log/query service.
#[async_trait]
pub trait LogQueryClient: Send + Sync {
    /// Run `query` and return the matching rows.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, BackendError>;
}
