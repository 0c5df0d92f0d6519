// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Failed deployment operations from the deployment-management service.

use std::sync::Arc;

use async_trait::async_trait;
use autotriage_core::{CancellationToken, DiagnosticsEntry, Result, RetryPolicy};

use crate::backends::{DeploymentClient, DeploymentOperation};
use crate::handler::DiagnosticsProvider;
use crate::request::{DiagnosisRequest, IssueType, context_keys};

/// Reports the failed operations of deployments into the request's resource group.
///
/// Shares its predicate with [`VmCreationDiagnostics`](super::VmCreationDiagnostics);
/// both run for a VM creation failure.
pub struct DeploymentOperationsDiagnostics {
    client: Arc<dyn DeploymentClient>,
}

impl DeploymentOperationsDiagnostics {
    pub const NAME: &'static str = "DeploymentOperationsDiagnostics";

    pub fn new(client: Arc<dyn DeploymentClient>) -> Self {
        Self { client }
    }
}

fn to_entry(operation: DeploymentOperation) -> DiagnosticsEntry {
    let mut entry = DiagnosticsEntry::new()
        .with_field("Timestamp", operation.timestamp.to_rfc3339())
        .with_field("DeploymentName", operation.deployment_name)
        .with_field("OperationId", operation.operation_id)
        .with_field("ProvisioningState", operation.provisioning_state);
    for (name, value) in [
        ("ResourceType", operation.resource_type),
        ("ResourceName", operation.resource_name),
        ("StatusCode", operation.status_code),
        ("StatusMessage", operation.status_message),
    ] {
        if let Some(value) = value {
            entry.insert(name, value);
        }
    }
    entry
}

#[async_trait]
impl DiagnosticsProvider for DeploymentOperationsDiagnostics {
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
        let subscription = request.require_context(context_keys::SUBSCRIPTION_ID)?;
        let resource_group = request.require_context(context_keys::RESOURCE_GROUP_NAME)?;
        let window = request.window();

        let operations = retry
            .execute("list-deployment-operations", cancellation, || {
                self.client
                    .list_operations(&subscription, &resource_group, &window)
            })
            .await?;

        let mut failed: Vec<DeploymentOperation> = operations
            .into_iter()
            .filter(|op| op.is_failed() && window.contains(op.timestamp))
            .collect();
        failed.sort_by_key(|op| op.timestamp);

        Ok(failed.into_iter().map(to_entry).collect())
    }
}
