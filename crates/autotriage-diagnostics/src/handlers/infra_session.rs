// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure session change state from the infrastructure-session service.

use std::sync::Arc;

use async_trait::async_trait;
use autotriage_core::{CancellationToken, DiagnosticsEntry, Result, RetryPolicy};

use crate::backends::{InfraSession, InfraSessionClient, SessionChange};
use crate::handler::DiagnosticsProvider;
use crate::request::{DiagnosisRequest, IssueType, context_keys};

/// Reports the failed session change together with the session's nodes.
pub struct InfraSessionDeploymentDiagnostics {
    client: Arc<dyn InfraSessionClient>,
}

impl InfraSessionDeploymentDiagnostics {
    pub const NAME: &'static str = "InfraSessionDeploymentDiagnostics";

    pub fn new(client: Arc<dyn InfraSessionClient>) -> Self {
        Self { client }
    }
}

fn to_entry(session: &InfraSession, change: SessionChange) -> DiagnosticsEntry {
    let mut entry = DiagnosticsEntry::new()
        .with_field("SessionId", session.id.clone())
        .with_field("SessionState", session.state.clone())
        .with_field("NodeIds", session.node_ids.join(","))
        .with_field("ChangeId", change.id)
        .with_field("ChangeStatus", change.status);
    if let Some(change_type) = change.change_type {
        entry.insert("ChangeType", change_type);
    }
    if let Some(message) = change.error_message {
        entry.insert("ErrorMessage", message);
    }
    if let Some(started) = change.started_at {
        entry.insert("StartedAt", started.to_rfc3339());
    }
    if let Some(completed) = change.completed_at {
        entry.insert("CompletedAt", completed.to_rfc3339());
    }
    entry
}

#[async_trait]
impl DiagnosticsProvider for InfraSessionDeploymentDiagnostics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn issue_types(&self) -> &'static [IssueType] {
        &[IssueType::InfrastructureSessionDeploymentFailure]
    }

    fn required_context(&self) -> &'static [&'static str] {
        &[
            context_keys::TIP_SESSION_ID,
            context_keys::TIP_SESSION_CHANGE_ID,
        ]
    }

    async fn collect(
        &self,
        request: &DiagnosisRequest,
        retry: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> Result<Vec<DiagnosticsEntry>> {
        let session_id = request.require_context(context_keys::TIP_SESSION_ID)?;
        let change_id = request.require_context(context_keys::TIP_SESSION_CHANGE_ID)?;

        let change = retry
            .execute("get-session-change", cancellation, || {
                self.client.get_session_change(&session_id, &change_id)
            })
            .await?;
        let session = retry
            .execute("get-session", cancellation, || {
                self.client.get_session(&session_id)
            })
            .await?;

        Ok(vec![to_entry(&session, change)])
    }
}
