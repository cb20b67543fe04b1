//! Error taxonomy for the orchestrator and the conversation loop
//!
//! Backend-level failures stay contained at the orchestrator boundary and are
//! turned into data (status reports, tool-result payloads). Only configuration
//! errors and "no backends at all" surface to the surrounding application.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::StartupReport;

/// Rejected configuration, raised before any backend is launched
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid backend '{backend}': {reason}")]
    InvalidBackend { backend: String, reason: String },

    #[error("backend '{0}' is configured more than once")]
    DuplicateBackend(String),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

/// A single backend failed to launch, handshake, or list its tools
#[derive(Debug, Clone, Error)]
#[error("backend '{backend}' failed to start: {cause}")]
pub struct BackendStartupError {
    pub backend: String,
    pub cause: String,
}

/// A failed tool call. Reported back to the model, never raised to the user.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'")]
    Unknown { name: String },

    #[error("tool '{tool}' on backend '{backend}' timed out after {timeout:?}")]
    Timeout {
        backend: String,
        tool: String,
        timeout: Duration,
    },

    #[error("tool '{tool}' on backend '{backend}' failed: {cause}")]
    Execution {
        backend: String,
        tool: String,
        cause: String,
    },
}

impl ToolError {
    /// Stable identifier used in the structured payload shown to the model
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "unknown_tool",
            Self::Timeout { .. } => "tool_timeout",
            Self::Execution { .. } => "tool_execution",
        }
    }
}

/// Errors from the orchestrator's public surface
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no MCP backends available ({report})")]
    NoBackendsAvailable { report: StartupReport },

    #[error("backends have already been started")]
    AlreadyStarted,
}

/// Collected failures from closing every connection
#[derive(Debug, Error)]
#[error("{} backend(s) failed to close cleanly: {}", .failures.len(), .failures.join("; "))]
pub struct ShutdownError {
    pub failures: Vec<String>,
}

/// A turn that could not produce a final answer
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("tool loop exceeded {rounds} rounds without a final answer")]
    ToolLoopExceeded { rounds: usize },

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model call timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error("turn cancelled")]
    Cancelled,
}
