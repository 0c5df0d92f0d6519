// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment-management service client.

use async_trait::async_trait;
use autotriage_core::BackendError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TimeWindow;

/// One operation of a resource group deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperation {
    pub deployment_name: String,
    pub operation_id: String,
    pub provisioning_state: String,
    pub resource_type: Option<String>,
    pub resource_name: Option<String>,
    pub status_code: Option<String>,
    pub status_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentOperation {
    /// Whether the operation ended in failure.
    pub fn is_failed(&self) -> bool {
        self.provisioning_state.eq_ignore_ascii_case("failed")
    }
}

/// Client for the deployment-management service.
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Operations of all deployments in a resource group within `window`.
    async fn list_operations(
        &self,
        subscription_id: &str,
        resource_group: &str,
        window: &TimeWindow,
    ) -> Result<Vec<DeploymentOperation>, BackendError>;
}
