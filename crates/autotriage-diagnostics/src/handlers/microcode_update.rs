// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Microcode update events on the node under test.

use std::sync::Arc;

use async_trait::async_trait;
use autotriage_core::{CancellationToken, DiagnosticsEntry, Result, RetryPolicy};

use crate::backends::{LogQuery, LogQueryClient};
use crate::handler::DiagnosticsProvider;
use crate::request::{DiagnosisRequest, IssueType, context_keys};

const DATABASE: &str = "NodeHealth";

const QUERY: &str = "\
declare query_parameters(nodeId:string);
MicrocodeUpdateEvents
| where PreciseTimeStamp between (_startTime .. _endTime)
| where NodeId == nodeId
| project PreciseTimeStamp, NodeId, MicrocodeVersion, TargetVersion, Status, Message
| order by PreciseTimeStamp asc";

/// Collects the microcode update history of the node under test.
pub struct MicrocodeUpdateDiagnostics {
    client: Arc<dyn LogQueryClient>,
}

impl MicrocodeUpdateDiagnostics {
    pub const NAME: &'static str = "MicrocodeUpdateDiagnostics";

    pub fn new(client: Arc<dyn LogQueryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticsProvider for MicrocodeUpdateDiagnostics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn issue_types(&self) -> &'static [IssueType] {
        &[IssueType::MicrocodeUpdateFailure]
    }

    fn required_context(&self) -> &'static [&'static str] {
        &[context_keys::TIP_NODE_ID]
    }

    async fn collect(
        &self,
        request: &DiagnosisRequest,
        retry: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> Result<Vec<DiagnosticsEntry>> {
        let query = LogQuery::new(DATABASE, QUERY, request.window())
            .with_parameter("nodeId", request.require_context(context_keys::TIP_NODE_ID)?);

        let records = retry
            .execute("microcode-update-query", cancellation, || {
                self.client.query(&query)
            })
            .await?;

        Ok(records.into_iter().map(DiagnosticsEntry::from).collect())
    }
}
