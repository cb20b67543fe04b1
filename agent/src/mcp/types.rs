//! MCP type definitions
//!
//! Shared types used by connections, the registry, and the orchestrator.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Separator between backend name and local tool name
pub const NAMESPACE_SEPARATOR: char = '.';

/// Static launch configuration for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Unique name, also the namespace prefix of the backend's tools
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Child environment; values are expanded with `${VAR}` syntax
    pub env: HashMap<String, String>,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Check the name can serve as a namespace and the command is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBackend {
            backend: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(
                "name may only contain ASCII letters, digits, '_' and '-'",
            ));
        }
        if self.command.trim().is_empty() {
            return Err(invalid("command must not be empty"));
        }
        Ok(())
    }
}

/// A tool as reported by its backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub local_name: String,
    pub description: String,
    /// Passed through to the model untouched
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(local_name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            local_name: local_name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A namespaced tool definition as handed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result payload of a tool call, kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    /// The backend answered but flagged the call as failed
    pub is_error: bool,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Initializing,
    Ready,
    Degraded,
    Failed,
    Closed,
}

impl BackendStatus {
    /// Whether the backend's tools may be routed to
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Failed and Closed are never left
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of starting one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Ready { tool_count: usize },
    Failed { reason: String },
}

impl StartupOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Per-backend result of `start_all`, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    entries: Vec<(String, StartupOutcome)>,
}

impl StartupReport {
    pub(crate) fn push(&mut self, name: String, outcome: StartupOutcome) {
        self.entries.push((name, outcome));
    }

    pub fn get(&self, name: &str) -> Option<&StartupOutcome> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StartupOutcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_ready()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for StartupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("no backends configured");
        }
        for (i, (name, outcome)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match outcome {
                StartupOutcome::Ready { tool_count } => {
                    write!(f, "{}: ready ({} tools)", name, tool_count)?
                }
                StartupOutcome::Failed { reason } => write!(f, "{}: failed ({})", name, reason)?,
            }
        }
        Ok(())
    }
}
