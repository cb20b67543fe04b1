//! Lifecycle and health of a single MCP backend
//!
//! ```text
//! Initializing ──connect ok──▶ Ready ◀──answered── Degraded
//!      │                        │   ──timeout──▶      │
//!      └──connect failed──▶ Failed ◀──second failure──┘
//! any live state ──close──▶ Closed
//! ```
//!
//! Failed and Closed are terminal. A connection that reaches Failed releases
//! its session immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::session::{BackendLauncher, BackendSession, SessionError};
use super::types::{BackendDescriptor, BackendStatus, ToolOutput, ToolSpec};
use crate::error::{BackendStartupError, ToolError};

/// How a call ended, as far as backend health is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallHealth {
    /// The backend answered (successfully or with a protocol error)
    Answered,
    /// Timeout or transport hiccup
    Recoverable,
    /// The channel is gone
    Fatal,
}

impl CallHealth {
    fn of(result: &Result<ToolOutput, SessionError>) -> Self {
        match result {
            Ok(_) | Err(SessionError::Remote(_)) => Self::Answered,
            Err(SessionError::Timeout(_)) | Err(SessionError::Transport(_)) => Self::Recoverable,
            Err(SessionError::Closed(_)) | Err(SessionError::Launch(_)) => Self::Fatal,
        }
    }
}

fn next_status(current: BackendStatus, health: CallHealth) -> BackendStatus {
    use BackendStatus::*;
    match (current, health) {
        (Ready | Degraded, CallHealth::Answered) => Ready,
        (Ready, CallHealth::Recoverable) => Degraded,
        (Degraded, CallHealth::Recoverable) => Failed,
        (Ready | Degraded, CallHealth::Fatal) => Failed,
        (other, _) => other,
    }
}

struct ConnectionState {
    status: BackendStatus,
    tools: Vec<ToolSpec>,
    session: Option<Arc<dyn BackendSession>>,
    last_error: Option<String>,
}

/// Point-in-time view of a connection for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub name: String,
    pub status: BackendStatus,
    pub tool_count: usize,
    pub last_error: Option<String>,
}

/// One configured backend and its live session
pub struct BackendConnection {
    descriptor: BackendDescriptor,
    launcher: Arc<dyn BackendLauncher>,
    state: RwLock<ConnectionState>,
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

async fn close_quietly(name: &str, session: Arc<dyn BackendSession>) {
    if let Err(e) = session.close().await {
        tracing::warn!("Error closing session for '{}': {}", name, e);
    }
}

/// Close a session given up after a failure on its own task.
///
/// The caller returns as soon as the state change is recorded, so dropping
/// its future cannot strand the connection between Failed and closed.
fn release_in_background(name: &str, session: Arc<dyn BackendSession>) {
    let name = name.to_string();
    tokio::spawn(async move { close_quietly(&name, session).await });
}

impl BackendConnection {
    pub fn new(descriptor: BackendDescriptor, launcher: Arc<dyn BackendLauncher>) -> Self {
        Self {
            descriptor,
            launcher,
            state: RwLock::new(ConnectionState {
                status: BackendStatus::Initializing,
                tools: Vec::new(),
                session: None,
                last_error: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub async fn status(&self) -> BackendStatus {
        self.state.read().await.status
    }

    /// Discovered tools; empty unless the connection is usable
    pub async fn tools(&self) -> Vec<ToolSpec> {
        self.snapshot().await.1
    }

    /// Status and tools read under one lock
    pub async fn snapshot(&self) -> (BackendStatus, Vec<ToolSpec>) {
        let state = self.state.read().await;
        (state.status, state.tools.clone())
    }

    pub async fn report(&self) -> ConnectionReport {
        let state = self.state.read().await;
        ConnectionReport {
            name: self.descriptor.name.clone(),
            status: state.status,
            tool_count: state.tools.len(),
            last_error: state.last_error.clone(),
        }
    }

    /// Spawn the backend, complete the handshake, and discover its tools.
    ///
    /// Returns the number of tools discovered. On failure the connection is
    /// `Failed` and holds no session.
    pub async fn connect(&self, timeout: Duration) -> Result<usize, BackendStartupError> {
        let mut state = self.state.write().await;
        if state.status != BackendStatus::Initializing {
            return Err(self.startup_error(format!("cannot connect while {}", state.status)));
        }

        tracing::info!("Connecting to MCP server: {}", self.descriptor.name);
        match self.handshake(timeout).await {
            Ok((session, tools)) => {
                let count = tools.len();
                state.status = BackendStatus::Ready;
                state.tools = tools;
                state.session = Some(session);
                tracing::info!(
                    "Server '{}': {} tools discovered",
                    self.descriptor.name,
                    count
                );
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Failed to start MCP server '{}': {}", self.descriptor.name, e);
                state.status = BackendStatus::Failed;
                state.last_error = Some(e.to_string());
                Err(self.startup_error(e.to_string()))
            }
        }
    }

    /// Launch then discover within one deadline, closing the session if discovery fails
    async fn handshake(
        &self,
        timeout: Duration,
    ) -> Result<(Arc<dyn BackendSession>, Vec<ToolSpec>), SessionError> {
        let deadline = Instant::now() + timeout;

        let session = tokio::time::timeout(timeout, self.launcher.launch(&self.descriptor))
            .await
            .map_err(|_| SessionError::Timeout(timeout))??;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let discovered = tokio::time::timeout(remaining, session.list_tools())
            .await
            .unwrap_or(Err(SessionError::Timeout(timeout)));

        match discovered {
            Ok(tools) => Ok((session, tools)),
            Err(e) => {
                close_quietly(&self.descriptor.name, session).await;
                Err(e)
            }
        }
    }

    fn startup_error(&self, cause: String) -> BackendStartupError {
        BackendStartupError {
            backend: self.descriptor.name.clone(),
            cause,
        }
    }

    /// Execute one tool call against this backend.
    ///
    /// No retry happens here. The outcome feeds the health state machine.
    pub async fn invoke(
        &self,
        local_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolError> {
        let execution_error = |cause: String| ToolError::Execution {
            backend: self.descriptor.name.clone(),
            tool: local_name.to_string(),
            cause,
        };

        let session = {
            let state = self.state.read().await;
            match (&state.session, state.status.is_usable()) {
                (Some(session), true) => session.clone(),
                _ => return Err(execution_error(format!("backend is {}", state.status))),
            }
        };

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(execution_error(format!(
                    "arguments must be a JSON object, got {}",
                    other
                )))
            }
        };

        tracing::debug!("Calling {}.{}", self.descriptor.name, local_name);
        let result = tokio::time::timeout(timeout, session.call_tool(local_name, arguments))
            .await
            .unwrap_or(Err(SessionError::Timeout(timeout)));

        self.record_outcome(&result).await;

        result.map_err(|e| match e {
            SessionError::Timeout(_) => ToolError::Timeout {
                backend: self.descriptor.name.clone(),
                tool: local_name.to_string(),
                timeout,
            },
            other => execution_error(other.to_string()),
        })
    }

    /// Apply a call outcome to the health state
    async fn record_outcome(&self, result: &Result<ToolOutput, SessionError>) {
        let released = {
            let mut state = self.state.write().await;
            let previous = state.status;
            let next = next_status(previous, CallHealth::of(result));
            if let Err(e) = result {
                if e.affects_health() {
                    state.last_error = Some(e.to_string());
                }
            }
            if next == previous {
                return;
            }

            tracing::warn!(
                "MCP server '{}' is now {} (was {})",
                self.descriptor.name,
                next,
                previous
            );
            state.status = next;
            if next == BackendStatus::Failed {
                state.tools.clear();
                state.session.take()
            } else {
                None
            }
        };

        if let Some(session) = released {
            release_in_background(&self.descriptor.name, session);
        }
    }

    /// Re-run discovery on a Degraded connection.
    ///
    /// Success returns it to Ready with the refreshed catalog; failure marks
    /// it Failed. Other states are returned unchanged.
    pub async fn rediscover(&self, timeout: Duration) -> BackendStatus {
        let session = {
            let state = self.state.read().await;
            match (&state.session, state.status) {
                (Some(session), BackendStatus::Degraded) => session.clone(),
                _ => return state.status,
            }
        };

        let discovered = tokio::time::timeout(timeout, session.list_tools())
            .await
            .unwrap_or(Err(SessionError::Timeout(timeout)));

        let released = {
            let mut state = self.state.write().await;
            if state.status != BackendStatus::Degraded {
                return state.status;
            }
            match discovered {
                Ok(tools) => {
                    tracing::info!(
                        "MCP server '{}' recovered with {} tools",
                        self.descriptor.name,
                        tools.len()
                    );
                    state.status = BackendStatus::Ready;
                    state.tools = tools;
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        "MCP server '{}' failed rediscovery: {}",
                        self.descriptor.name,
                        e
                    );
                    state.status = BackendStatus::Failed;
                    state.last_error = Some(e.to_string());
                    state.tools.clear();
                    state.session.take()
                }
            }
        };

        if let Some(session) = released {
            release_in_background(&self.descriptor.name, session);
        }
        self.status().await
    }

    /// Release the session and process. Idempotent.
    ///
    /// A Failed connection stays Failed; every other state becomes Closed.
    pub async fn close(&self) -> Result<(), SessionError> {
        let session = {
            let mut state = self.state.write().await;
            if state.status == BackendStatus::Closed {
                return Ok(());
            }
            if state.status != BackendStatus::Failed {
                state.status = BackendStatus::Closed;
            }
            state.tools.clear();
            state.session.take()
        };

        match session {
            Some(session) => {
                tracing::info!("Closing MCP server: {}", self.descriptor.name);
                session.close().await
            }
            None => Ok(()),
        }
    }
}
