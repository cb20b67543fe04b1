//! Transport seam between a connection and its backend process
//!
//! A [`BackendLauncher`] turns a descriptor into a live [`BackendSession`].
//! The stdio implementation lives in `spawn.rs`; `memory.rs` provides a
//! scripted backend for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{BackendDescriptor, ToolOutput, ToolSpec};

/// Transport-level failure, classified for the health state machine
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The process could not be spawned or did not complete the handshake
    #[error("launch failed: {0}")]
    Launch(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The channel is gone (broken pipe, process exited)
    #[error("transport closed: {0}")]
    Closed(String),

    /// A transport hiccup that does not prove the process dead
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a protocol-level error
    #[error("backend error: {0}")]
    Remote(String),
}

impl SessionError {
    /// Whether the failure says anything about backend health
    pub fn affects_health(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }
}

/// A live request/response channel to one backend
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Retrieve the backend's tool catalog
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, SessionError>;

    /// Execute a tool and return its result payload
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError>;

    /// Terminate the channel and reap the process. Must tolerate repeated calls.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Starts backend processes and performs the protocol handshake
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    async fn launch(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn BackendSession>, SessionError>;
}
