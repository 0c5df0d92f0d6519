// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Explicit handler registration.
//!
//! Handlers are named by [`HandlerKind`] and built by [`HandlerFactory`] from
//! the backend clients the host provides. The resulting [`HandlerRegistry`]
//! is an ordered table the dispatcher fans out over.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use autotriage_core::{ConfigError, Result, TriageConfig, TriageError};
use tracing::{info, warn};

use crate::backends::{DeploymentClient, InfraSessionClient, LogQueryClient};
use crate::handler::{DiagnosticHandler, HandlerServices, ProviderHandler};
use crate::handlers::{
    DeploymentOperationsDiagnostics, InfraSessionDeploymentDiagnostics,
    MicrocodeUpdateDiagnostics, VmCreationDiagnostics,
};

/// Every handler the engine knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    VmCreation,
    DeploymentOperations,
    InfraSessionDeployment,
    MicrocodeUpdate,
}

impl HandlerKind {
    /// All kinds, in registration order.
    pub const ALL: [HandlerKind; 4] = [
        HandlerKind::VmCreation,
        HandlerKind::DeploymentOperations,
        HandlerKind::InfraSessionDeployment,
        HandlerKind::MicrocodeUpdate,
    ];

    /// Configuration name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::VmCreation => "vm-creation",
            HandlerKind::DeploymentOperations => "deployment-operations",
            HandlerKind::InfraSessionDeployment => "infra-session-deployment",
            HandlerKind::MicrocodeUpdate => "microcode-update",
        }
    }

    /// Name of the handler this kind builds.
    pub fn handler_name(self) -> &'static str {
        match self {
            HandlerKind::VmCreation => VmCreationDiagnostics::NAME,
            HandlerKind::DeploymentOperations => DeploymentOperationsDiagnostics::NAME,
            HandlerKind::InfraSessionDeployment => InfraSessionDeploymentDiagnostics::NAME,
            HandlerKind::MicrocodeUpdate => MicrocodeUpdateDiagnostics::NAME,
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        HandlerKind::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str().eq_ignore_ascii_case(wanted)
                    || kind.handler_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ConfigError::UnknownHandler(wanted.to_string()))
    }
}

/// Ordered table of registered handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn DiagnosticHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Names must be unique.
    pub fn register(&mut self, handler: Arc<dyn DiagnosticHandler>) -> Result<()> {
        if self.get(handler.name()).is_some() {
            return Err(TriageError::invalid_argument(
                "handler",
                format!("a handler named '{}' is already registered", handler.name()),
            ));
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, handler: Arc<dyn DiagnosticHandler>) -> Result<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DiagnosticHandler>> {
        self.handlers.iter().find(|handler| handler.name() == name)
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> &[Arc<dyn DiagnosticHandler>] {
        &self.handlers
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Backend clients available to the factory. Absent clients disable the
/// handlers that need them.
#[derive(Default, Clone)]
pub struct BackendClients {
    pub log_query: Option<Arc<dyn LogQueryClient>>,
    pub deployments: Option<Arc<dyn DeploymentClient>>,
    pub infra_sessions: Option<Arc<dyn InfraSessionClient>>,
}

impl BackendClients {
    pub fn with_log_query(mut self, client: Arc<dyn LogQueryClient>) -> Self {
        self.log_query = Some(client);
        self
    }

    pub fn with_deployments(mut self, client: Arc<dyn DeploymentClient>) -> Self {
        self.deployments = Some(client);
        self
    }

    pub fn with_infra_sessions(mut self, client: Arc<dyn InfraSessionClient>) -> Self {
        self.infra_sessions = Some(client);
        self
    }
}

/// Builds handlers from backend clients and shared services.
pub struct HandlerFactory {
    clients: BackendClients,
    services: HandlerServices,
}

impl HandlerFactory {
    pub fn new(clients: BackendClients, services: HandlerServices) -> Self {
        Self { clients, services }
    }

    /// Build the handler for `kind`, or `None` if its backend client is absent.
    pub fn create(&self, kind: HandlerKind) -> Option<Arc<dyn DiagnosticHandler>> {
        let services = self.services.clone();
        let handler: Arc<dyn DiagnosticHandler> = match kind {
            HandlerKind::VmCreation => Arc::new(ProviderHandler::new(
                VmCreationDiagnostics::new(self.clients.log_query.clone()?),
                services,
            )),
            HandlerKind::DeploymentOperations => Arc::new(ProviderHandler::new(
                DeploymentOperationsDiagnostics::new(self.clients.deployments.clone()?),
                services,
            )),
            HandlerKind::InfraSessionDeployment => Arc::new(ProviderHandler::new(
                InfraSessionDeploymentDiagnostics::new(self.clients.infra_sessions.clone()?),
                services,
            )),
            HandlerKind::MicrocodeUpdate => Arc::new(ProviderHandler::new(
                MicrocodeUpdateDiagnostics::new(self.clients.log_query.clone()?),
                services,
            )),
        };
        Some(handler)
    }

    /// Build a registry holding the kinds selected by `config` (all when unset).
    ///
    /// Unknown kind names fail; kinds whose client is absent are skipped.
    pub fn build_registry(&self, config: &TriageConfig) -> Result<HandlerRegistry> {
        let kinds: Vec<HandlerKind> = match &config.handlers {
            Some(names) => names
                .iter()
                .map(|name| name.parse::<HandlerKind>())
                .collect::<std::result::Result<_, _>>()?,
            None => HandlerKind::ALL.to_vec(),
        };

        let mut registry = HandlerRegistry::new();
        for kind in kinds {
            if registry.get(kind.handler_name()).is_some() {
                continue;
            }
            match self.create(kind) {
                Some(handler) => registry.register(handler)?,
                None => warn!(
                    kind = %kind,
                    "Backend client not configured, handler disabled"
                ),
            }
        }

        info!(handlers = ?registry.names(), "Diagnostic handlers registered");
        Ok(registry)
    }
}
