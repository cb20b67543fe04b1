//! LLM abstraction layer

mod ollama;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use ollama::{clean_schema_for_ollama, OllamaModel};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{RecordedRequest, ScriptedModel};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::agent::Turn;
use crate::mcp::ToolSchema;

/// Everything the model sees for one round
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_prompt: Option<&'a str>,
    pub history: &'a [Turn],
    pub tools: &'a [ToolSchema],
}

/// A tool call proposed by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Provider-assigned id, if any
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }
}

/// What the model answered with
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls {
        /// Text accompanying the calls, often empty
        content: String,
        calls: Vec<ToolCallRequest>,
    },
}

/// Trait for LLM backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next reply for the given history and tool set
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelReply>;

    /// Get the model name
    fn model(&self) -> &str;
}
