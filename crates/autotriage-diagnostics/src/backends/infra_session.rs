// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure-session service client.

use async_trait::async_trait;
use autotriage_core::BackendError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An infrastructure session holding one or more nodes under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraSession {
    pub id: String,
    pub state: String,
    pub node_ids: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A change applied within a session, e.g. a deployment to its nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChange {
    pub id: String,
    pub session_id: String,
    pub status: String,
    pub change_type: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Client for the infrastructure-session service.
#[async_trait]
pub trait InfraSessionClient: Send + Sync {
    /// Fetch a session.
    async fn get_session(&self, session_id: &str) -> Result<InfraSession, BackendError>;

    /// Fetch one change of a session.
    async fn get_session_change(
        &self,
        session_id: &str,
        change_id: &str,
    ) -> Result<SessionChange, BackendError>;
}
