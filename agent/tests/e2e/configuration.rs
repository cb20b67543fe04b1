//! E2E test: configuration files feeding a session

use std::io::Write;
use std::sync::Arc;

use multiclient::config::{AgentFileConfig, McpConfig};
use multiclient::error::ConfigError;
use multiclient::llm::ScriptedModel;
use multiclient::mcp::memory::{InMemoryLauncher, MemoryBackend};
use multiclient::session::{ChatSession, SessionConfig};

fn write_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_session_from_config_files() {
    let mcp = write_file(
        r#"{
            "mcpServers": {
                "postgres": {
                    "command": "postgres-mcp",
                    "args": ["--read-only"],
                    "env": {"DATABASE_URL": "${DATABASE_URL}"}
                },
                "search": {"command": "search-mcp"}
            }
        }"#,
    );
    let agent = write_file(
        r#"
[llm]
model = "llama3.1:8b"

[agent]
system_prompt = "Answer with data from the tools."
max_rounds = 3
history_window = 20

[timeouts]
tool_secs = 10
"#,
    );

    let config = SessionConfig {
        backends: McpConfig::load_from_path(mcp.path())
            .unwrap()
            .descriptors()
            .unwrap(),
        agent: AgentFileConfig::load_from_path(agent.path()).unwrap(),
    };
    assert_eq!(config.backends[0].args, vec!["--read-only".to_string()]);
    assert_eq!(config.loop_settings().max_rounds, 3);
    assert_eq!(config.timeouts().tool.as_secs(), 10);

    let launcher = InMemoryLauncher::new()
        .with_backend("postgres", MemoryBackend::new().tool("query", "SQL"))
        .with_backend("search", MemoryBackend::new().tool("query", "Web"));
    let model = Arc::new(ScriptedModel::new().text("ok"));

    let mut session = ChatSession::start_with(config, Arc::new(launcher), model.clone())
        .await
        .unwrap();
    assert_eq!(session.handle_message("hi").await, "ok");

    let request = &model.requests()[0];
    assert_eq!(
        request.system_prompt.as_deref(),
        Some("Answer with data from the tools.")
    );
    assert_eq!(request.tool_names, vec!["postgres.query", "search.query"]);

    session.end().await.unwrap();
}

#[test]
fn test_bad_configs_rejected_before_launch() {
    let unknown_field = write_file(r#"{"mcpServers": {"pg": {"command": "pg", "timeout": 5}}}"#);
    assert!(matches!(
        McpConfig::load_from_path(unknown_field.path()),
        Err(ConfigError::Parse { .. })
    ));

    let empty_command = McpConfig::parse(r#"{"mcpServers": {"pg": {"command": ""}}}"#).unwrap();
    assert!(matches!(
        empty_command.descriptors(),
        Err(ConfigError::InvalidBackend { .. })
    ));

    let dotted = McpConfig::parse(r#"{"mcpServers": {"pg.main": {"command": "pg"}}}"#).unwrap();
    assert!(matches!(
        dotted.descriptors(),
        Err(ConfigError::InvalidBackend { .. })
    ));

    let zero_window = write_file("[agent]\nhistory_window = 0\n");
    assert!(matches!(
        AgentFileConfig::load_from_path(zero_window.path()),
        Err(ConfigError::InvalidSetting { .. })
    ));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = McpConfig::load_from_path(&dir.path().join(".mcp.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
