//! E2E test: the rmcp client against a real MCP server over stdio
//!
//! Spawns the `multiclient-test-server` binary built from this package.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use multiclient::error::ToolError;
use multiclient::mcp::{
    BackendDescriptor, BackendStatus, McpMultiClient, StartupOutcome, StdioLauncher, Timeouts,
};

const TEST_SERVER: &str = env!("CARGO_BIN_EXE_multiclient-test-server");

async fn started() -> McpMultiClient {
    let client = McpMultiClient::new(
        Arc::new(StdioLauncher::new()),
        Timeouts {
            startup: Duration::from_secs(10),
            tool: Duration::from_secs(10),
        },
    );
    let report = client
        .start_all(vec![BackendDescriptor::new("echo", TEST_SERVER)])
        .await
        .unwrap();
    assert_eq!(report.get("echo"), Some(&StartupOutcome::Ready { tool_count: 4 }));
    client
}

async fn echo_status(client: &McpMultiClient) -> BackendStatus {
    client.statuses().await[0].status
}

#[tokio::test]
async fn test_discovers_and_calls_tools() {
    let client = started().await;

    let schemas = client.tool_schemas().await;
    let mut names: Vec<_> = schemas.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["echo.crash", "echo.echo", "echo.fail", "echo.reject"]);

    let echo = schemas.iter().find(|t| t.name == "echo.echo").unwrap();
    assert_eq!(echo.description, "Return the given text unchanged");
    assert_eq!(echo.input_schema["type"], "object");
    assert!(echo.input_schema["properties"]["text"].is_object());

    let output = client
        .execute("echo.echo", json!({"text": "users\norders"}))
        .await
        .unwrap();
    assert!(!output.is_error);
    assert_eq!(output.payload["content"][0]["type"], "text");
    assert_eq!(output.payload["content"][0]["text"], "users\norders");

    client.shutdown().await.unwrap();
    assert_eq!(echo_status(&client).await, BackendStatus::Closed);
}

#[tokio::test]
async fn test_tool_errors_keep_backend_ready() {
    let client = started().await;

    let output = client.execute("echo.fail", json!({})).await.unwrap();
    assert!(output.is_error);
    assert_eq!(output.payload["isError"], true);
    assert_eq!(output.payload["content"][0]["text"], "requested failure");
    assert_eq!(echo_status(&client).await, BackendStatus::Ready);

    let err = client.execute("echo.reject", json!({})).await.unwrap_err();
    match err {
        ToolError::Execution {
            backend,
            tool,
            cause,
        } => {
            assert_eq!(backend, "echo");
            assert_eq!(tool, "reject");
            assert!(cause.contains("rejected by test server"), "got: {}", cause);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(echo_status(&client).await, BackendStatus::Ready);

    // Still answering after both errors
    client
        .execute("echo.echo", json!({"text": "still here"}))
        .await
        .unwrap();

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exited_server_fails_backend() {
    let client = started().await;

    let err = client.execute("echo.crash", json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::Execution { .. }), "got: {}", err);
    assert_eq!(echo_status(&client).await, BackendStatus::Failed);
    assert!(client.statuses().await[0].last_error.is_some());

    assert!(client.tool_schemas().await.is_empty());
    assert!(matches!(
        client.execute("echo.echo", json!({"text": "hello"})).await,
        Err(ToolError::Unknown { .. })
    ));

    client.shutdown().await.unwrap();
    assert_eq!(echo_status(&client).await, BackendStatus::Failed);
}
