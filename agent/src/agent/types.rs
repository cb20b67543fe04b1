//! Conversation history types

use serde::Serialize;
use serde_json::Value;

/// A tool call committed to the history, always carrying an id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    /// Qualified `backend.tool` name as proposed by the model
    pub name: String,
    pub arguments: Value,
}

/// One role-tagged history entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Plain assistant text, no tool calls
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn content(&self) -> &str {
        match self {
            Self::User { content }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }
}

/// Ordered history of one chat session. Only ever appended to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Trailing turns to send to the model.
    ///
    /// At most `limit` turns, except that the slice always starts at a user
    /// turn: if the last `limit` turns contain none, the window grows back to
    /// the most recent one.
    pub fn window(&self, limit: Option<usize>) -> &[Turn] {
        let Some(limit) = limit else {
            return &self.turns;
        };

        let from = self.turns.len().saturating_sub(limit);
        let start = self.turns[from..]
            .iter()
            .position(Turn::is_user)
            .map(|offset| from + offset)
            .or_else(|| self.turns.iter().rposition(Turn::is_user))
            .unwrap_or(0);
        &self.turns[start..]
    }
}
