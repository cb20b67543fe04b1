//! Chat session lifecycle
//!
//! A [`ChatSession`] bundles one conversation with the orchestrator it talks
//! through. The hosting application keeps one session per UI session and
//! passes it explicitly to the hooks below.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{ConversationLoop, ConversationState, EventSender, LoopSettings};
use crate::config::{AgentFileConfig, McpConfig};
use crate::error::{ConfigError, OrchestratorError, ShutdownError, TurnError};
use crate::llm::{LanguageModel, OllamaModel};
use crate::mcp::{
    BackendDescriptor, BackendLauncher, McpMultiClient, StartupReport, StdioLauncher, Timeouts,
};

/// Shown to the user when a turn cannot produce an answer
pub const GENERIC_FAILURE: &str = "Sorry, I could not complete this request.";

/// Everything needed to start a session
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub backends: Vec<BackendDescriptor>,
    pub agent: AgentFileConfig,
}

impl SessionConfig {
    /// Load `.mcp.json` and `.agent.toml` from their usual locations
    pub fn load() -> Result<Self, ConfigError> {
        let backends = match McpConfig::load()? {
            Some(config) => config.descriptors()?,
            None => Vec::new(),
        };
        Ok(Self {
            backends,
            agent: AgentFileConfig::load()?,
        })
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from(&self.agent.timeouts)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings::from(&self.agent)
    }
}

pub struct ChatSession {
    id: Uuid,
    orchestrator: Arc<McpMultiClient>,
    /// Whether ending the session shuts the backends down
    owns_orchestrator: bool,
    conversation: ConversationLoop,
    cancel: CancellationToken,
    report: Option<StartupReport>,
}

impl ChatSession {
    /// Start stdio backends and an Ollama model from the config
    pub async fn start(config: SessionConfig) -> Result<Self, OrchestratorError> {
        let model = Arc::new(OllamaModel::new(
            &config.agent.llm.url,
            &config.agent.llm.model,
        ));
        Self::start_with(config, Arc::new(StdioLauncher::new()), model).await
    }

    /// Start with explicit launcher and model
    pub async fn start_with(
        config: SessionConfig,
        launcher: Arc<dyn BackendLauncher>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, OrchestratorError> {
        let orchestrator = Arc::new(McpMultiClient::new(launcher, config.timeouts()));
        let report = orchestrator.start_all(config.backends.clone()).await?;

        let session = Self {
            id: Uuid::new_v4(),
            orchestrator,
            owns_orchestrator: true,
            conversation: ConversationLoop::new(model, config.loop_settings()),
            cancel: CancellationToken::new(),
            report: Some(report),
        };
        tracing::info!("Session {} started ({})", session.id, session.conversation.model());
        Ok(session)
    }

    /// Session over an already-started orchestrator shared with other sessions.
    ///
    /// Ending it leaves the backends running.
    pub fn with_shared(
        orchestrator: Arc<McpMultiClient>,
        model: Arc<dyn LanguageModel>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            orchestrator,
            owns_orchestrator: false,
            conversation: ConversationLoop::new(model, settings),
            cancel: CancellationToken::new(),
            report: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn orchestrator(&self) -> &Arc<McpMultiClient> {
        &self.orchestrator
    }

    /// Present only for sessions that started their own backends
    pub fn startup_report(&self) -> Option<&StartupReport> {
        self.report.as_ref()
    }

    pub fn history(&self) -> &ConversationState {
        self.conversation.state()
    }

    pub fn conversation(&self) -> &ConversationLoop {
        &self.conversation
    }

    pub fn set_event_sender(&mut self, sender: Option<EventSender>) {
        self.conversation.set_event_sender(sender);
    }

    /// Token that aborts the in-flight turn and every later one
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one message, returning the typed error on failure
    pub async fn try_handle_message(&mut self, text: &str) -> Result<String, TurnError> {
        let recovered = self.orchestrator.recover_degraded().await;
        if recovered > 0 {
            tracing::info!("{} MCP server(s) recovered", recovered);
        }

        self.conversation
            .run_turn_until(&self.orchestrator, text, &self.cancel)
            .await
    }

    /// Run one message; failures become a generic reply and the session stays usable
    pub async fn handle_message(&mut self, text: &str) -> String {
        match self.try_handle_message(text).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Session {}: {}", self.id, e);
                GENERIC_FAILURE.to_string()
            }
        }
    }

    /// Cancel in-flight work and release owned backends
    pub async fn end(self) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        tracing::info!("Session {} ended", self.id);
        if self.owns_orchestrator {
            self.orchestrator.shutdown().await
        } else {
            Ok(())
        }
    }
}

/// Start a session from configuration
pub async fn on_session_start(config: SessionConfig) -> Result<ChatSession, OrchestratorError> {
    ChatSession::start(config).await
}

pub async fn handle_message(session: &mut ChatSession, text: &str) -> String {
    session.handle_message(text).await
}

pub async fn on_session_end(session: ChatSession) -> Result<(), ShutdownError> {
    session.end().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::mcp::memory::{InMemoryLauncher, MemoryBackend};
    use crate::mcp::BackendStatus;
    use serde_json::json;

    fn config(names: &[&str]) -> SessionConfig {
        SessionConfig {
            backends: names
                .iter()
                .map(|n| BackendDescriptor::new(*n, "memory"))
                .collect(),
            agent: AgentFileConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_owned_session_shuts_down_backends() {
        let launcher = InMemoryLauncher::new()
            .with_backend("pg", MemoryBackend::new().tool("listTables", "List tables"));
        let model = Arc::new(ScriptedModel::new().text("hi"));

        let mut session = ChatSession::start_with(config(&["pg"]), Arc::new(launcher.clone()), model)
            .await
            .unwrap();
        assert_eq!(session.startup_report().unwrap().ready_count(), 1);
        assert_eq!(session.handle_message("hello").await, "hi");

        session.end().await.unwrap();
        assert_eq!(launcher.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_generic_message() {
        let launcher =
            InMemoryLauncher::new().with_backend("pg", MemoryBackend::new().tool("query", "SQL"));
        let model = Arc::new(ScriptedModel::new().error("model offline").text("recovered"));
        let mut session = ChatSession::start_with(config(&["pg"]), Arc::new(launcher), model)
            .await
            .unwrap();

        assert_eq!(handle_message(&mut session, "first").await, GENERIC_FAILURE);
        assert_eq!(handle_message(&mut session, "second").await, "recovered");
        on_session_end(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_orchestrator_survives_session_end() {
        let launcher =
            InMemoryLauncher::new().with_backend("pg", MemoryBackend::new().tool("query", "SQL"));
        let orchestrator = Arc::new(McpMultiClient::new(
            Arc::new(launcher.clone()),
            Timeouts::default(),
        ));
        orchestrator
            .start_all(vec![BackendDescriptor::new("pg", "memory")])
            .await
            .unwrap();

        let model = Arc::new(
            ScriptedModel::new()
                .tool_call("pg.query", json!({}))
                .text("one")
                .text("two"),
        );
        let mut first =
            ChatSession::with_shared(orchestrator.clone(), model.clone(), LoopSettings::default());
        let mut second =
            ChatSession::with_shared(orchestrator.clone(), model, LoopSettings::default());
        assert_ne!(first.id(), second.id());

        assert_eq!(first.handle_message("a").await, "one");
        first.end().await.unwrap();

        assert_eq!(second.handle_message("b").await, "two");
        assert_eq!(second.history().len(), 2);
        assert_eq!(orchestrator.statuses().await[0].status, BackendStatus::Ready);
        assert_eq!(launcher.open_sessions(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_session_stops_turns() {
        let launcher =
            InMemoryLauncher::new().with_backend("pg", MemoryBackend::new().tool("query", "SQL"));
        let model = Arc::new(ScriptedModel::new().text("never"));
        let mut session = ChatSession::start_with(config(&["pg"]), Arc::new(launcher), model.clone())
            .await
            .unwrap();

        session.cancellation().cancel();
        assert!(matches!(
            session.try_handle_message("hi").await,
            Err(TurnError::Cancelled)
        ));
        assert_eq!(model.request_count(), 0);
        session.end().await.unwrap();
    }
}
