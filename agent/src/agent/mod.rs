//! Agent module - LLM with tool-calling capabilities
//!
//! This implements the "tool-using agent loop" where:
//! 1. User sends a message
//! 2. LLM receives the history along with the namespaced tools
//! 3. LLM decides whether to call tools or respond directly
//! 4. If tools are called, they run concurrently and their results are fed back
//! 5. Loop continues until LLM responds without tool calls, or the round bound hits

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::AgentFileConfig;
use crate::error::TurnError;
use crate::llm::{LanguageModel, ModelReply, ModelRequest, ToolCallRequest};
use crate::mcp::{McpMultiClient, ToolSchema};

pub mod events;
pub use events::{event_channel, AgentEvent, AgentEventSender, EventReceiver, EventSender};

mod types;
pub use types::{ConversationState, ToolCall, Turn};

mod tools;
pub use tools::{error_payload, render_output};

/// Where the loop is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Thinking,
    ExecutingTools,
    /// The last turn ended in an error; the next turn starts normally
    Failed,
}

/// Per-session loop settings
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub system_prompt: Option<String>,
    /// Maximum model rounds per user message
    pub max_rounds: usize,
    /// Trailing turns sent to the model (None = whole history)
    pub history_window: Option<usize>,
    pub model_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentFileConfig::default())
    }
}

impl From<&AgentFileConfig> for LoopSettings {
    fn from(config: &AgentFileConfig) -> Self {
        Self {
            system_prompt: config.agent.system_prompt.clone(),
            max_rounds: config.agent.max_rounds,
            history_window: config.agent.history_window,
            model_timeout: config.timeouts.model(),
        }
    }
}

/// Drives one conversation: model rounds, tool execution, history
pub struct ConversationLoop {
    model: Arc<dyn LanguageModel>,
    settings: LoopSettings,
    state: ConversationState,
    phase: LoopPhase,
    event_sender: AgentEventSender,
}

impl ConversationLoop {
    pub fn new(model: Arc<dyn LanguageModel>, settings: LoopSettings) -> Self {
        Self {
            model,
            settings,
            state: ConversationState::new(),
            phase: LoopPhase::Idle,
            event_sender: AgentEventSender::none(),
        }
    }

    /// Set event sender for real-time event visibility
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = AgentEventSender::new(sender);
        self
    }

    pub fn set_event_sender(&mut self, sender: Option<EventSender>) {
        self.event_sender = match sender {
            Some(s) => AgentEventSender::new(s),
            None => AgentEventSender::none(),
        };
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn model(&self) -> &str {
        self.model.model()
    }

    /// Run one user message to a final assistant answer.
    ///
    /// The user turn is recorded even when the turn fails. Each round's
    /// tool-call turn is committed together with all of its results.
    pub async fn run_turn(
        &mut self,
        orchestrator: &McpMultiClient,
        message: &str,
    ) -> Result<String, TurnError> {
        let started = Instant::now();
        self.event_sender.processing_start(message);
        self.state.push(Turn::user(message));

        match self.drive(orchestrator, started).await {
            Ok(answer) => {
                self.phase = LoopPhase::Idle;
                Ok(answer)
            }
            Err(e) => {
                tracing::warn!("Turn failed: {}", e);
                self.phase = LoopPhase::Failed;
                self.event_sender.error(&e.to_string());
                Err(e)
            }
        }
    }

    /// `run_turn`, abandoned as soon as `cancel` fires.
    ///
    /// Work in flight is dropped; the history keeps only whole rounds.
    pub async fn run_turn_until(
        &mut self,
        orchestrator: &McpMultiClient,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        let outcome = tokio::select! {
            result = self.run_turn(orchestrator, message) => result,
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
        };

        if let Err(TurnError::Cancelled) = outcome {
            tracing::info!("Turn cancelled");
            self.phase = LoopPhase::Failed;
            self.event_sender.error("turn cancelled");
        }
        outcome
    }

    async fn drive(
        &mut self,
        orchestrator: &McpMultiClient,
        started: Instant,
    ) -> Result<String, TurnError> {
        for round in 1..=self.settings.max_rounds {
            self.phase = LoopPhase::Thinking;
            let tools = orchestrator.tool_schemas().await;
            tracing::debug!("Round {} with {} tools", round, tools.len());

            let reply = self.ask_model(&tools).await?;
            let (content, calls) = match reply {
                ModelReply::ToolCalls { content, calls } if !calls.is_empty() => (content, calls),
                ModelReply::ToolCalls { content, .. } | ModelReply::Text(content) => {
                    self.event_sender.round(round, 0);
                    self.state.push(Turn::assistant(content.as_str()));
                    self.event_sender
                        .response_complete(&content, round, started.elapsed());
                    return Ok(content);
                }
            };

            self.event_sender.round(round, calls.len());
            tracing::info!("Agent making {} tool call(s)", calls.len());
            self.phase = LoopPhase::ExecutingTools;

            let calls = assign_ids(round, calls);
            let results = execute_calls(orchestrator, &calls, &self.event_sender).await;

            self.state.push(Turn::Assistant {
                content,
                tool_calls: calls,
            });
            self.state.extend(results);
        }

        tracing::warn!(
            "Agent reached max rounds ({}), stopping",
            self.settings.max_rounds
        );
        Err(TurnError::ToolLoopExceeded {
            rounds: self.settings.max_rounds,
        })
    }

    async fn ask_model(&self, tools: &[ToolSchema]) -> Result<ModelReply, TurnError> {
        let request = ModelRequest {
            system_prompt: self.settings.system_prompt.as_deref(),
            history: self.state.window(self.settings.history_window),
            tools,
        };

        let timeout = self.settings.model_timeout;
        match tokio::time::timeout(timeout, self.model.respond(request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(TurnError::Model(format!("{:#}", e))),
            Err(_) => Err(TurnError::ModelTimeout(timeout)),
        }
    }
}

/// Give every proposed call an id, generating `call_{round}_{index}` if missing
fn assign_ids(round: usize, calls: Vec<ToolCallRequest>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}_{}", round, index)),
            name: call.name,
            arguments: call.arguments,
        })
        .collect()
}

/// Run calls concurrently; results come back in proposal order
async fn execute_calls(
    orchestrator: &McpMultiClient,
    calls: &[ToolCall],
    events: &AgentEventSender,
) -> Vec<Turn> {
    join_all(
        calls
            .iter()
            .map(|call| execute_call(orchestrator, call, events)),
    )
    .await
}

async fn execute_call(
    orchestrator: &McpMultiClient,
    call: &ToolCall,
    events: &AgentEventSender,
) -> Turn {
    events.tool_start(&call.name, &call.arguments);
    let start = Instant::now();

    let (content, is_error) = match orchestrator.execute(&call.name, call.arguments.clone()).await {
        Ok(output) => (render_output(&output), output.is_error),
        Err(e) => {
            tracing::warn!("Tool call {} failed: {}", call.name, e);
            (error_payload(&e), true)
        }
    };

    let elapsed = start.elapsed();
    tracing::info!(
        "Tool {} returned in {}ms: {}...",
        call.name,
        elapsed.as_millis(),
        content.chars().take(100).collect::<String>()
    );
    events.tool_complete(&call.name, &content, elapsed, is_error);

    Turn::ToolResult {
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        content,
        is_error,
    }
}
