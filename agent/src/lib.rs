//! Chat agent that orchestrates tools from multiple MCP servers

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod session;
