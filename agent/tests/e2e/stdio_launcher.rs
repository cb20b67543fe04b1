//! E2E test: real child processes through the stdio launcher
//!
//! Uses only binaries present on any unix system; none of them speak MCP,
//! so every backend must fail startup cleanly and quickly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use multiclient::error::OrchestratorError;
use multiclient::mcp::{
    BackendDescriptor, BackendStatus, McpMultiClient, StartupOutcome, StdioLauncher, Timeouts,
};

fn orchestrator(startup: Duration) -> McpMultiClient {
    McpMultiClient::new(
        Arc::new(StdioLauncher::new()),
        Timeouts {
            startup,
            tool: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn test_missing_binary_fails_startup() {
    let client = orchestrator(Duration::from_secs(5));
    let err = client
        .start_all(vec![BackendDescriptor::new(
            "ghost",
            "/nonexistent/multiclient-test-mcp-server",
        )])
        .await
        .unwrap_err();

    match err {
        OrchestratorError::NoBackendsAvailable { report } => match report.get("ghost") {
            Some(StartupOutcome::Failed { reason }) => {
                assert!(reason.contains("failed to spawn"), "got: {}", reason)
            }
            other => panic!("unexpected outcome: {:?}", other),
        },
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(client.statuses().await[0].status, BackendStatus::Failed);
}

#[tokio::test]
async fn test_silent_process_times_out() {
    let client = orchestrator(Duration::from_millis(500));
    let started = Instant::now();

    let err = client
        .start_all(vec![
            BackendDescriptor::new("sleeper", "sleep").with_args(["30"])
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::NoBackendsAvailable { .. }));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "startup took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_exiting_process_fails_startup() {
    let client = orchestrator(Duration::from_secs(5));
    let report = match client
        .start_all(vec![BackendDescriptor::new("quitter", "true")])
        .await
    {
        Err(OrchestratorError::NoBackendsAvailable { report }) => report,
        Err(other) => panic!("unexpected error: {}", other),
        Ok(report) => panic!("unexpected success: {}", report),
    };
    assert!(matches!(
        report.get("quitter"),
        Some(StartupOutcome::Failed { .. })
    ));
}
