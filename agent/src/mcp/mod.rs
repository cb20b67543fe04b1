//! MCP (Model Context Protocol) multi-backend client
//!
//! Connects to every MCP server defined in .mcp.json, namespaces their tools
//! as `backend.tool`, and routes calls to the owning backend.

mod connection;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod multi_client;
mod registry;
mod session;
mod spawn;
mod types;

pub use connection::{BackendConnection, ConnectionReport};
pub use multi_client::{McpMultiClient, Timeouts};
pub use registry::{
    qualified_name, split_qualified, ConnectionSnapshot, NamespacedTool, ToolRegistry,
};
pub use session::{BackendLauncher, BackendSession, SessionError};
pub use spawn::{RmcpSession, StdioLauncher};
pub use types::{
    BackendDescriptor, BackendStatus, StartupOutcome, StartupReport, ToolOutput, ToolSchema,
    ToolSpec, NAMESPACE_SEPARATOR,
};
