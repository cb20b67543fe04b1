//! MCP test server
//!
//! Speaks MCP over stdio with a fixed catalog covering each way a tool call
//! can end: a normal answer, an `isError` result, a JSON-RPC error, and the
//! process exiting mid-call.
//!
//! Built only with the `test-util` feature.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EchoParams {
    #[schemars(description = "Text to send back")]
    pub text: String,
}

#[derive(Clone)]
pub struct TestServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TestServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Return the given text unchanged")]
    async fn echo(
        &self,
        Parameters(params): Parameters<EchoParams>,
    ) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(params.text)]))
    }

    #[tool(description = "Answer with a tool-level error result")]
    async fn fail(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::error(vec![Content::text("requested failure")]))
    }

    #[tool(description = "Reject the request with a JSON-RPC error")]
    async fn reject(&self) -> Result<CallToolResult, McpError> {
        Err(McpError::invalid_params("rejected by test server", None))
    }

    #[tool(description = "Exit the process without answering")]
    async fn crash(&self) -> Result<CallToolResult, McpError> {
        tracing::info!("Exiting on request");
        std::process::exit(0)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for TestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Test server for the multiclient transport tests".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let service = TestServer::new().serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
