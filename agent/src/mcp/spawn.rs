//! Stdio MCP client sessions
//!
//! Spawns the backend as a child process and speaks MCP over its stdin/stdout
//! using rmcp. The session keeps the running service alive until `close`.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, Tool},
    service::{Peer, RunningService, ServiceError},
    transport::TokioChildProcess,
    RoleClient, ServiceExt,
};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

use super::session::{BackendLauncher, BackendSession, SessionError};
use super::types::{BackendDescriptor, ToolOutput, ToolSpec};

/// Launches backends as child processes speaking MCP over stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioLauncher;

impl StdioLauncher {
    pub fn new() -> Self {
        Self
    }
}

/// Build the child command, expanding `${VAR}` references in env values
fn build_command(descriptor: &BackendDescriptor) -> Command {
    let mut cmd = Command::new(&descriptor.command);
    if !descriptor.args.is_empty() {
        cmd.args(&descriptor.args);
    }
    for (key, value) in &descriptor.env {
        let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
        cmd.env(key, expanded.as_ref());
    }
    cmd.kill_on_drop(true);
    cmd
}

#[async_trait]
impl BackendLauncher for StdioLauncher {
    async fn launch(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn BackendSession>, SessionError> {
        tracing::debug!(
            "Spawning MCP server '{}': {} {:?}",
            descriptor.name,
            descriptor.command,
            descriptor.args
        );

        let transport = TokioChildProcess::new(build_command(descriptor)).map_err(|e| {
            SessionError::Launch(format!("failed to spawn '{}': {}", descriptor.command, e))
        })?;

        // Dropping a half-initialized transport kills the child
        let service = ()
            .serve(transport)
            .await
            .map_err(|e| SessionError::Launch(format!("handshake failed: {}", e)))?;

        Ok(Arc::new(RmcpSession::new(descriptor.name.clone(), service)))
    }
}

/// A live rmcp client session
pub struct RmcpSession {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl RmcpSession {
    fn new(name: String, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            name,
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

/// Map rmcp errors onto the health classes the connection understands
fn classify(err: ServiceError) -> SessionError {
    match err {
        ServiceError::McpError(data) => SessionError::Remote(data.message.to_string()),
        ServiceError::TransportClosed => SessionError::Closed("transport closed".to_string()),
        ServiceError::Cancelled { reason } => {
            SessionError::Closed(reason.unwrap_or_else(|| "session cancelled".to_string()))
        }
        ServiceError::Timeout { timeout } => SessionError::Timeout(timeout),
        other => SessionError::Transport(other.to_string()),
    }
}

fn tool_spec(tool: Tool) -> ToolSpec {
    ToolSpec {
        local_name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema: Value::Object(tool.input_schema.as_ref().clone()),
    }
}

fn tool_output(result: CallToolResult) -> Result<ToolOutput, SessionError> {
    let is_error = result.is_error.unwrap_or(false);
    let payload = serde_json::to_value(&result)
        .map_err(|e| SessionError::Transport(format!("unserializable tool result: {}", e)))?;
    Ok(ToolOutput { payload, is_error })
}

#[async_trait]
impl BackendSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, SessionError> {
        let tools = self.peer.list_all_tools().await.map_err(classify)?;
        Ok(tools.into_iter().map(tool_spec).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(classify)?;
        tool_output(result)
    }

    async fn close(&self) -> Result<(), SessionError> {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            tracing::debug!("Stopping MCP server: {}", self.name);
            service
                .cancel()
                .await
                .map_err(|e| SessionError::Transport(format!("failed to stop '{}': {}", self.name, e)))?;
        }
        Ok(())
    }
}
