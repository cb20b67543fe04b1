//! Agent events for real-time visibility
//!
//! Emitted by the conversation loop while a turn runs. Consumers include the
//! CLI's verbose output and tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ============================================================================
// Agent Events
// ============================================================================

/// Events emitted by the agent during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent is starting to process a message
    ProcessingStart {
        /// The user's input message
        message: String,
    },

    /// A model round finished
    Round {
        number: usize,
        /// Tool calls proposed in this round (0 for a final answer)
        tool_calls: usize,
    },

    /// Tool execution is starting
    ToolStart {
        /// Qualified tool name
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolComplete {
        name: String,
        /// Result text as appended to the history
        result: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        is_error: bool,
    },

    /// Final response ready
    ResponseComplete {
        content: String,
        /// Model rounds used
        rounds: usize,
        #[serde(with = "duration_millis")]
        total_duration: Duration,
    },

    /// The turn failed
    Error { message: String },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Event Channel
// ============================================================================

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// Event Sender Helper
// ============================================================================

/// Optional event sink; a no-op when nobody listens
#[derive(Clone, Default)]
pub struct AgentEventSender {
    sender: Option<EventSender>,
}

impl AgentEventSender {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Create a no-op sender (events are discarded)
    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    /// Send an event (silently fails if no sender or receiver dropped)
    pub fn send(&self, event: AgentEvent) {
        if let Some(ref sender) = self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn processing_start(&self, message: &str) {
        self.send(AgentEvent::ProcessingStart {
            message: message.to_string(),
        });
    }

    pub fn round(&self, number: usize, tool_calls: usize) {
        self.send(AgentEvent::Round { number, tool_calls });
    }

    pub fn tool_start(&self, name: &str, arguments: &serde_json::Value) {
        self.send(AgentEvent::ToolStart {
            name: name.to_string(),
            arguments: arguments.clone(),
        });
    }

    pub fn tool_complete(&self, name: &str, result: &str, duration: Duration, is_error: bool) {
        self.send(AgentEvent::ToolComplete {
            name: name.to_string(),
            result: result.to_string(),
            duration,
            is_error,
        });
    }

    pub fn response_complete(&self, content: &str, rounds: usize, total_duration: Duration) {
        self.send(AgentEvent::ResponseComplete {
            content: content.to_string(),
            rounds,
            total_duration,
        });
    }

    pub fn error(&self, message: &str) {
        self.send(AgentEvent::Error {
            message: message.to_string(),
        });
    }
}
