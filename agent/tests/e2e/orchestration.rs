//! E2E test: chat sessions routing tool calls across backends

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use multiclient::agent::{event_channel, AgentEvent, Turn};
use multiclient::config::AgentFileConfig;
use multiclient::error::{OrchestratorError, TurnError};
use multiclient::llm::{ModelReply, ScriptedModel, ToolCallRequest};
use multiclient::mcp::memory::{text_payload, InMemoryLauncher, MemoryBackend, ScriptedCall};
use multiclient::mcp::{BackendDescriptor, BackendStatus, StartupOutcome};
use multiclient::session::{ChatSession, SessionConfig, GENERIC_FAILURE};

fn session_config(names: &[&str]) -> SessionConfig {
    let mut agent = AgentFileConfig::default();
    agent.timeouts.tool_secs = 1;
    SessionConfig {
        backends: names
            .iter()
            .map(|n| BackendDescriptor::new(*n, format!("{}-mcp", n)))
            .collect(),
        agent,
    }
}

fn tool_results(turns: &[Turn]) -> Vec<(String, String, bool)> {
    turns
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult {
                tool_name,
                content,
                is_error,
                ..
            } => Some((tool_name.clone(), content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_list_tables_end_to_end() {
    let postgres = MemoryBackend::new()
        .tool("listTables", "List database tables")
        .tool("query", "Run a read-only SQL query")
        .script(ScriptedCall::Reply(text_payload("users\norders")));
    let launcher = InMemoryLauncher::new()
        .with_backend("postgres", postgres.clone())
        .with_backend("search", MemoryBackend::new().tool("query", "Search the web"));
    let model = Arc::new(
        ScriptedModel::new()
            .tool_call("postgres.listTables", json!({}))
            .text("There are two tables: users and orders."),
    );

    let mut session = ChatSession::start_with(
        session_config(&["postgres", "search"]),
        Arc::new(launcher.clone()),
        model.clone(),
    )
    .await
    .unwrap();

    let answer = session.handle_message("What tables are in the database?").await;
    assert_eq!(answer, "There are two tables: users and orders.");

    let turns = session.history().turns();
    assert_eq!(turns.len(), 4);
    assert!(turns[0].is_user());
    match &turns[1] {
        Turn::Assistant { tool_calls, .. } => {
            assert_eq!(tool_calls.len(), 1);
            assert_eq!(tool_calls[0].name, "postgres.listTables");
        }
        other => panic!("expected tool-call turn, got {:?}", other),
    }
    match (&turns[1], &turns[2]) {
        (Turn::Assistant { tool_calls, .. }, Turn::ToolResult { call_id, content, .. }) => {
            assert_eq!(&tool_calls[0].id, call_id);
            assert_eq!(content, "users\norders");
        }
        other => panic!("unexpected turns: {:?}", other),
    }
    assert_eq!(turns[3], Turn::assistant("There are two tables: users and orders."));

    // Same local name on two backends stays distinguishable
    let offered = &model.requests()[0].tool_names;
    assert_eq!(
        offered,
        &vec!["postgres.listTables", "postgres.query", "search.query"]
    );
    assert_eq!(postgres.calls()[0].tool, "listTables");

    session.end().await.unwrap();
    assert_eq!(launcher.open_sessions(), 0);
}

#[tokio::test]
async fn test_partial_startup_failure() {
    let launcher = InMemoryLauncher::new()
        .with_backend("a", MemoryBackend::new().tool("query", "Query a"))
        .with_backend("b", MemoryBackend::new().failing_launch("exit status 1"));
    let model = Arc::new(
        ScriptedModel::new()
            .tool_calls(vec![
                ToolCallRequest::new("a.query", json!({"q": 1})),
                ToolCallRequest::new("b.query", json!({"q": 2})),
            ])
            .text("Only a answered."),
    );

    let mut session =
        ChatSession::start_with(session_config(&["a", "b"]), Arc::new(launcher), model)
            .await
            .unwrap();

    let report = session.startup_report().unwrap();
    assert_eq!(report.get("a"), Some(&StartupOutcome::Ready { tool_count: 1 }));
    assert_eq!(
        report.get("b"),
        Some(&StartupOutcome::Failed {
            reason: "launch failed: exit status 1".to_string()
        })
    );

    assert_eq!(session.handle_message("ask both").await, "Only a answered.");

    let results = tool_results(session.history().turns());
    assert_eq!(results[0], ("a.query".to_string(), "query ok".to_string(), false));
    let (name, content, is_error) = &results[1];
    assert_eq!(name, "b.query");
    assert!(is_error);
    let payload: Value = serde_json::from_str(content).unwrap();
    assert_eq!(payload["error"]["kind"], "unknown_tool");

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_no_backends_available() {
    let launcher = InMemoryLauncher::new()
        .with_backend("a", MemoryBackend::new().failing_launch("not found"))
        .with_backend("b", MemoryBackend::new().slow_launch(Duration::from_secs(60)));
    let mut config = session_config(&["a", "b"]);
    config.agent.timeouts.startup_secs = 1;

    let result = ChatSession::start_with(
        config,
        Arc::new(launcher.clone()),
        Arc::new(ScriptedModel::new()),
    )
    .await;

    match result {
        Err(OrchestratorError::NoBackendsAvailable { report }) => {
            assert_eq!(report.len(), 2);
            assert_eq!(report.ready_count(), 0);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("session should not start without backends"),
    }
    assert_eq!(launcher.open_sessions(), 0);
}

#[tokio::test]
async fn test_round_bound_keeps_session_usable() {
    let launcher =
        InMemoryLauncher::new().with_backend("pg", MemoryBackend::new().tool("query", "SQL"));
    let looping = ModelReply::ToolCalls {
        content: String::new(),
        calls: vec![ToolCallRequest::new("pg.query", json!({}))],
    };
    let model = Arc::new(ScriptedModel::new().always(looping));
    let mut config = session_config(&["pg"]);
    config.agent.agent.max_rounds = 2;

    let mut session = ChatSession::start_with(config, Arc::new(launcher), model.clone())
        .await
        .unwrap();

    assert!(matches!(
        session.try_handle_message("loop forever").await,
        Err(TurnError::ToolLoopExceeded { rounds: 2 })
    ));
    assert_eq!(session.handle_message("again").await, GENERIC_FAILURE);
    assert_eq!(model.request_count(), 4);
    // Partial history kept: 2 x (user + 2 rounds of call/result)
    assert_eq!(session.history().len(), 10);

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_results_in_proposal_order() {
    let slow = MemoryBackend::new().tool("get", "Slow").script(ScriptedCall::Delay(
        Duration::from_millis(150),
        text_payload("slow result"),
    ));
    let fast = MemoryBackend::new().tool("get", "Fast");
    let launcher = InMemoryLauncher::new()
        .with_backend("slow", slow)
        .with_backend("fast", fast);
    let model = Arc::new(
        ScriptedModel::new()
            .tool_calls(vec![
                ToolCallRequest::new("slow.get", json!({})),
                ToolCallRequest::new("fast.get", json!({})),
            ])
            .text("done"),
    );

    let mut session =
        ChatSession::start_with(session_config(&["slow", "fast"]), Arc::new(launcher), model)
            .await
            .unwrap();
    let (tx, mut rx) = event_channel();
    session.set_event_sender(Some(tx));

    assert_eq!(session.handle_message("both").await, "done");
    session.set_event_sender(None);

    let results = tool_results(session.history().turns());
    let names: Vec<_> = results.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["slow.get", "fast.get"]);
    assert_eq!(results[0].1, "slow result");

    let mut completed = Vec::new();
    while let Some(event) = rx.recv().await {
        if let AgentEvent::ToolComplete { name, .. } = event {
            completed.push(name);
        }
    }
    assert_eq!(completed, vec!["fast.get", "slow.get"]);

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_hung_backend_recovers_between_turns() {
    let flaky = MemoryBackend::new()
        .tool("query", "SQL")
        .script(ScriptedCall::Hang)
        .script(ScriptedCall::Hang);
    let launcher = InMemoryLauncher::new()
        .with_backend("flaky", flaky)
        .with_backend("steady", MemoryBackend::new().tool("ping", "Ping"));
    let model = Arc::new(
        ScriptedModel::new()
            .tool_call("flaky.query", json!({}))
            .text("first timed out")
            .tool_call("flaky.query", json!({}))
            .text("second timed out"),
    );
    let mut session = ChatSession::start_with(
        session_config(&["flaky", "steady"]),
        Arc::new(launcher),
        model.clone(),
    )
        .await
        .unwrap();
    let orchestrator = session.orchestrator().clone();

    assert_eq!(session.handle_message("one").await, "first timed out");
    let results = tool_results(session.history().turns());
    assert!(results[0].1.contains("tool_timeout"));
    assert_eq!(
        orchestrator.statuses().await[0].status,
        BackendStatus::Degraded
    );

    // Rediscovery before the next turn returns it to Ready, so one more
    // timeout only degrades it again
    assert_eq!(session.handle_message("two").await, "second timed out");
    let statuses = orchestrator.statuses().await;
    assert_eq!(statuses[0].status, BackendStatus::Degraded);
    assert_eq!(statuses[1].status, BackendStatus::Ready);
    assert!(model.requests()[2]
        .tool_names
        .contains(&"flaky.query".to_string()));

    session.end().await.unwrap();
}
