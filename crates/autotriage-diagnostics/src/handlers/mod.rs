// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concrete diagnostics providers, one per telemetry backend query.

mod deployment_operations;
mod infra_session;
mod microcode_update;
mod vm_creation;

pub use deployment_operations::DeploymentOperationsDiagnostics;
pub use infra_session::InfraSessionDeploymentDiagnostics;
pub use microcode_update::MicrocodeUpdateDiagnostics;
pub use vm_creation::VmCreationDiagnostics;
