// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VM provisioning failures from the log/query service.

use std::sync::Arc;

use async_trait::async_trait;
use autotriage_core::{CancellationToken, DiagnosticsEntry, Result, RetryPolicy};

use crate::backends::{LogQuery, LogQueryClient};
use crate::handler::DiagnosticsProvider;
use crate::request::{DiagnosisRequest, IssueType, context_keys};

const DATABASE: &str = "ComputeProvisioning";

const QUERY: &str = "\
declare query_parameters(subscriptionId:string, resourceGroupName:string);
VmProvisioningEvents
| where PreciseTimeStamp between (_startTime .. _endTime)
| where SubscriptionId == subscriptionId and ResourceGroupName =~ resourceGroupName
| where Result != 'Succeeded'
| project PreciseTimeStamp, VmName, OperationName, Result, ErrorCode, ErrorMessage
| order by PreciseTimeStamp asc";

/// Looks up failed VM provisioning operations in the request's resource group.
pub struct VmCreationDiagnostics {
    client: Arc<dyn LogQueryClient>,
}

impl VmCreationDiagnostics {
    pub const NAME: &'static str = "VmCreationDiagnostics";

    pub fn new(client: Arc<dyn LogQueryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticsProvider for VmCreationDiagnostics {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn issue_types(&self) -> &'static [IssueType] {
        &[IssueType::VmCreationFailure]
    }

    fn required_context(&self) -> &'static [&'static str] {
        &[
            context_keys::SUBSCRIPTION_ID,
            context_keys::RESOURCE_GROUP_NAME,
        ]
    }

    async fn collect(
        &self,
        request: &DiagnosisRequest,
        retry: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> Result<Vec<DiagnosticsEntry>> {
        let query = LogQuery::new(DATABASE, QUERY, request.window())
            .with_parameter(
                "subscriptionId",
                request.require_context(context_keys::SUBSCRIPTION_ID)?,
            )
            .with_parameter(
                "resourceGroupName",
                request.require_context(context_keys::RESOURCE_GROUP_NAME)?,
            );

        let records = retry
            .execute("vm-provisioning-query", cancellation, || {
                self.client.query(&query)
            })
            .await?;

        Ok(records.into_iter().map(DiagnosticsEntry::from).collect())
    }
}
