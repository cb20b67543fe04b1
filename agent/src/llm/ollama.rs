//! Ollama LLM implementation
//!
//! Talks to `/api/chat` directly over HTTP; tool definitions and tool calls
//! use Ollama's OpenAI-style function format.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LanguageModel, ModelReply, ModelRequest, ToolCallRequest};
use crate::agent::Turn;
use crate::mcp::ToolSchema;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    stream: bool,
}

/// A message in the conversation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    /// Set on `tool` messages so the model can match results to calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// A tool definition for Ollama
#[derive(Debug, Serialize, Clone)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatToolFunction,
}

#[derive(Debug, Serialize, Clone)]
struct ChatToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Clean up a JSON schema for Ollama compatibility
/// Removes $schema, title, and other fields that confuse Ollama
pub fn clean_schema_for_ollama(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => {
            let mut cleaned = serde_json::Map::new();
            for (key, value) in obj {
                if key == "$schema" || key == "title" || key == "additionalProperties" {
                    continue;
                }
                cleaned.insert(key.clone(), clean_schema_for_ollama(value));
            }
            Value::Object(cleaned)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(clean_schema_for_ollama).collect()),
        other => other.clone(),
    }
}

fn to_chat_tools(tools: &[ToolSchema]) -> Vec<ChatTool> {
    tools
        .iter()
        .map(|tool| ChatTool {
            tool_type: "function",
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: clean_schema_for_ollama(&tool.input_schema),
            },
        })
        .collect()
}

fn to_chat_messages(request: &ModelRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    if let Some(system) = request.system_prompt {
        messages.push(ChatMessage::new("system", system));
    }

    for turn in request.history {
        let message = match turn {
            Turn::User { content } => ChatMessage::new("user", content.as_str()),
            Turn::Assistant {
                content,
                tool_calls,
            } => ChatMessage {
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: Some(call.id.clone()),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect(),
                ..ChatMessage::new("assistant", content.as_str())
            },
            Turn::ToolResult {
                tool_name, content, ..
            } => ChatMessage {
                tool_name: Some(tool_name.clone()),
                ..ChatMessage::new("tool", content.as_str())
            },
        };
        messages.push(message);
    }

    messages
}

fn to_reply(message: ChatMessage) -> ModelReply {
    if message.tool_calls.is_empty() {
        return ModelReply::Text(message.content);
    }

    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();
    ModelReply::ToolCalls {
        content: message.content,
        calls,
    }
}

/// Normalise to `scheme://host:port[/prefix]`, defaulting to the local Ollama
///
/// A path prefix is kept so a server mounted under a reverse proxy still
/// resolves `/api/chat` below it.
fn base_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("localhost");
            let port = parsed.port().unwrap_or(DEFAULT_OLLAMA_PORT);
            let prefix = parsed.path().trim_end_matches('/');
            format!("{}://{}:{}{}", parsed.scheme(), host, port, prefix)
        }
        Err(e) => {
            tracing::warn!("Invalid Ollama URL '{}' ({}), using {}", url, e, DEFAULT_OLLAMA_URL);
            DEFAULT_OLLAMA_URL.to_string()
        }
    }
}

/// Ollama chat model over direct HTTP
pub struct OllamaModel {
    base_url: String,
    http_client: reqwest::Client,
    model: String,
}

impl OllamaModel {
    pub fn new(url: &str, model: &str) -> Self {
        Self {
            base_url: base_url(url),
            http_client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: to_chat_messages(&request),
            tools: to_chat_tools(request.tools),
            stream: false,
        };

        tracing::debug!(
            "Ollama request: model={} messages={} tools={}",
            self.model,
            body.messages.len(),
            body.tools.len()
        );

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to send HTTP request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, text));
        }

        let raw_body = response.text().await.context("Failed to get response text")?;
        let parsed: ChatResponse =
            serde_json::from_str(&raw_body).context("Failed to parse Ollama response")?;

        tracing::debug!(
            "Ollama response: {} chars, {} tool call(s)",
            parsed.message.content.len(),
            parsed.message.tool_calls.len()
        );
        Ok(to_reply(parsed.message))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
