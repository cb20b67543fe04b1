//! Multi-backend MCP orchestrator
//!
//! Owns every [`BackendConnection`] plus the published [`ToolRegistry`].
//! Backends start, run, and close independently; the registry is the only
//! shared structure and is swapped as a whole under an exclusive writer, so
//! readers always see a complete snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;

use super::connection::{BackendConnection, ConnectionReport};
use super::registry::{ConnectionSnapshot, ToolRegistry};
use super::session::BackendLauncher;
use super::spawn::StdioLauncher;
use super::types::{
    BackendDescriptor, BackendStatus, StartupOutcome, StartupReport, ToolOutput, ToolSchema,
};
use crate::config::TimeoutConfig;
use crate::error::{ConfigError, OrchestratorError, ShutdownError, ToolError};

/// Bounds applied to backend operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Launch + handshake + discovery, and rediscovery
    pub startup: Duration,
    /// A single tool call
    pub tool: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            startup: config.startup(),
            tool: config.tool(),
        }
    }
}

/// Orchestrates tool discovery and execution across MCP backends
pub struct McpMultiClient {
    launcher: Arc<dyn BackendLauncher>,
    timeouts: Timeouts,
    connections: RwLock<Vec<Arc<BackendConnection>>>,
    registry: RwLock<Arc<ToolRegistry>>,
}

impl McpMultiClient {
    pub fn new(launcher: Arc<dyn BackendLauncher>, timeouts: Timeouts) -> Self {
        Self {
            launcher,
            timeouts,
            connections: RwLock::new(Vec::new()),
            registry: RwLock::new(Arc::new(ToolRegistry::empty())),
        }
    }

    /// Orchestrator that spawns backends as stdio child processes
    pub fn stdio(timeouts: Timeouts) -> Self {
        Self::new(Arc::new(StdioLauncher::new()), timeouts)
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Connect every backend independently and publish the resulting registry.
    ///
    /// All descriptors are validated before anything is launched. Fails as a
    /// whole only when no backend becomes Ready.
    pub async fn start_all(
        &self,
        descriptors: Vec<BackendDescriptor>,
    ) -> Result<StartupReport, OrchestratorError> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            descriptor.validate()?;
            if !seen.insert(descriptor.name.clone()) {
                return Err(ConfigError::DuplicateBackend(descriptor.name.clone()).into());
            }
        }

        let connections = {
            let mut slot = self.connections.write().await;
            if !slot.is_empty() {
                return Err(OrchestratorError::AlreadyStarted);
            }
            *slot = descriptors
                .into_iter()
                .map(|d| Arc::new(BackendConnection::new(d, self.launcher.clone())))
                .collect();
            slot.clone()
        };

        tracing::info!("Starting {} MCP server(s)", connections.len());
        let startup = self.timeouts.startup;
        let results = join_all(connections.iter().map(|c| c.connect(startup))).await;

        let mut report = StartupReport::default();
        for (connection, result) in connections.iter().zip(results) {
            let outcome = match result {
                Ok(tool_count) => StartupOutcome::Ready { tool_count },
                Err(e) => StartupOutcome::Failed { reason: e.cause },
            };
            report.push(connection.name().to_string(), outcome);
        }

        self.rebuild_registry().await;

        if report.ready_count() == 0 {
            tracing::error!("No MCP servers available: {}", report);
            if let Err(e) = self.shutdown().await {
                tracing::warn!("{}", e);
            }
            return Err(OrchestratorError::NoBackendsAvailable { report });
        }

        tracing::info!(
            "{} of {} MCP server(s) ready with {} tools",
            report.ready_count(),
            report.len(),
            self.registry().await.len()
        );
        Ok(report)
    }

    /// Execute a model-proposed tool call.
    ///
    /// Unknown names fail without contacting any backend. Timeouts and
    /// execution failures are returned to the caller; nothing is retried.
    pub async fn execute(
        &self,
        qualified_name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, ToolError> {
        let (connection, local_name) = {
            let registry = self.registry().await;
            let tool = registry.resolve(qualified_name)?;
            (tool.connection.clone(), tool.spec.local_name.clone())
        };

        // The backend may have changed state since the registry was published
        if !connection.status().await.is_usable() {
            self.rebuild_registry().await;
            return Err(ToolError::Unknown {
                name: qualified_name.to_string(),
            });
        }

        tracing::info!("Executing {} on server {}", local_name, connection.name());
        let result = connection
            .invoke(&local_name, arguments, self.timeouts.tool)
            .await;

        if !connection.status().await.is_usable() {
            self.rebuild_registry().await;
        }
        result
    }

    /// Attempt rediscovery on every Degraded backend, then republish.
    ///
    /// Returns how many backends came back to Ready.
    pub async fn recover_degraded(&self) -> usize {
        let mut degraded = Vec::new();
        for connection in self.connections().await {
            if connection.status().await == BackendStatus::Degraded {
                degraded.push(connection);
            }
        }
        if degraded.is_empty() {
            return 0;
        }

        tracing::info!("Rediscovering {} degraded MCP server(s)", degraded.len());
        let startup = self.timeouts.startup;
        let statuses = join_all(degraded.iter().map(|c| c.rediscover(startup))).await;
        self.rebuild_registry().await;

        statuses
            .into_iter()
            .filter(|s| *s == BackendStatus::Ready)
            .count()
    }

    /// Close every connection, collecting individual failures
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        let connections = self.connections().await;
        let results = join_all(connections.iter().map(|c| async move {
            (c.name().to_string(), c.close().await)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| format!("{}: {}", name, e)))
            .collect();
        for failure in &failures {
            tracing::error!("Error cleaning up server {}", failure);
        }

        self.rebuild_registry().await;
        tracing::info!("MCP servers shut down");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }

    /// The currently published registry.
    ///
    /// A snapshot still routing to a backend that has since left the usable
    /// states is rebuilt before it is handed out.
    pub async fn registry(&self) -> Arc<ToolRegistry> {
        let published = self.registry.read().await.clone();
        if published.is_current().await {
            return published;
        }
        tracing::debug!("Published tool registry is stale, rebuilding");
        self.rebuild_registry().await
    }

    /// Namespaced tool schemas for the model
    pub async fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.registry().await.describe_all()
    }

    pub async fn connections(&self) -> Vec<Arc<BackendConnection>> {
        self.connections.read().await.clone()
    }

    pub async fn statuses(&self) -> Vec<ConnectionReport> {
        let mut reports = Vec::new();
        for connection in self.connections().await {
            reports.push(connection.report().await);
        }
        reports
    }

    /// Recompute the registry from current connection state and swap it in
    async fn rebuild_registry(&self) -> Arc<ToolRegistry> {
        let mut registry = self.registry.write().await;
        let connections = self.connections.read().await.clone();

        let mut snapshots = Vec::with_capacity(connections.len());
        for connection in &connections {
            snapshots.push(ConnectionSnapshot::capture(connection).await);
        }

        *registry = Arc::new(ToolRegistry::rebuild(snapshots));
        tracing::debug!("Tool registry rebuilt: {} tools", registry.len());
        registry.clone()
    }
}
