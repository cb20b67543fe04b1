//! Scripted model for tests (`test-util` feature)
//!
//! Replies are served in order; once the script runs out the fallback reply
//! (if any) repeats forever. Every request is recorded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{LanguageModel, ModelReply, ModelRequest, ToolCallRequest};
use crate::agent::Turn;

/// A request as seen by the scripted model
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system_prompt: Option<String>,
    pub history: Vec<Turn>,
    pub tool_names: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    fallback: Option<ModelReply>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: ModelReply) -> Self {
        lock(&self.replies).push_back(Ok(reply));
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.reply(ModelReply::Text(text.to_string()))
    }

    /// Queue a reply proposing a single tool call
    pub fn tool_call(self, name: &str, arguments: Value) -> Self {
        self.tool_calls(vec![ToolCallRequest::new(name, arguments)])
    }

    pub fn tool_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.reply(ModelReply::ToolCalls {
            content: String::new(),
            calls,
        })
    }

    /// Queue a transport-level failure
    pub fn error(self, message: &str) -> Self {
        lock(&self.replies).push_back(Err(message.to_string()));
        self
    }

    /// Reply served once the script is exhausted
    pub fn always(mut self, reply: ModelReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Wait this long before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        lock(&self.requests).push(RecordedRequest {
            system_prompt: request.system_prompt.map(str::to_string),
            history: request.history.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.replies).pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted model has no reply left")),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
