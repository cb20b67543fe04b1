//! Configuration loading
//!
//! Two files drive a session:
//! - `.mcp.json` lists the MCP backends (`mcpServers`), in launch order
//! - `.agent.toml` holds model, loop and timeout settings (all optional)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::BackendDescriptor;

/// Directory name used for the global config fallback (~/.config/multiclient/)
const APP_DIR: &str = "multiclient";

/// Environment variable that overrides the `.mcp.json` location
pub const MCP_CONFIG_ENV: &str = "MCP_CONFIG_PATH";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/multiclient/
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join(APP_DIR).join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// MCP backends (.mcp.json)
// ============================================================================

/// MCP server configuration (from .mcp.json)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    /// Backends keyed by name, in file order
    #[serde(rename = "mcpServers")]
    pub mcp_servers: IndexMap<String, McpServerConfig>,
}

/// A single backend entry. Unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpConfig {
    /// Load MCP config
    ///
    /// Search order:
    /// 1. `$MCP_CONFIG_PATH` if set
    /// 2. Walk up directory tree from cwd looking for .mcp.json
    /// 3. Check ~/.config/multiclient/.mcp.json (global fallback)
    pub fn load() -> Result<Option<Self>, ConfigError> {
        if let Ok(path) = std::env::var(MCP_CONFIG_ENV) {
            tracing::debug!("Loading MCP config from ${}: {}", MCP_CONFIG_ENV, path);
            return Self::load_from_path(Path::new(&path)).map(Some);
        }

        if let Some(config_path) = find_config_file(".mcp.json") {
            tracing::debug!("Loading MCP config from: {}", config_path.display());
            return Self::load_from_path(&config_path).map(Some);
        }

        tracing::debug!("No .mcp.json found");
        Ok(None)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse the JSON form of the config
    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Convert entries to validated backend descriptors, in file order
    pub fn descriptors(&self) -> Result<Vec<BackendDescriptor>, ConfigError> {
        self.mcp_servers
            .iter()
            .map(|(name, server)| {
                let descriptor = BackendDescriptor {
                    name: name.clone(),
                    command: server.command.clone(),
                    args: server.args.clone(),
                    env: server.env.clone(),
                };
                descriptor.validate()?;
                Ok(descriptor)
            })
            .collect()
    }
}

// ============================================================================
// Agent Configuration (.agent.toml)
// ============================================================================

/// Top-level agent configuration (from .agent.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentFileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSectionConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// LLM configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

/// Agent configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSectionConfig {
    pub system_prompt: Option<String>,
    /// Maximum model rounds per user message
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Trailing turns sent to the model (None = whole history)
    pub history_window: Option<usize>,
}

/// Timeouts, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_startup_secs")]
    pub startup_secs: u64,
    #[serde(default = "default_tool_secs")]
    pub tool_secs: u64,
    #[serde(default = "default_model_secs")]
    pub model_secs: u64,
}

// Default value functions
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen3-coder:30b".to_string()
}

fn default_max_rounds() -> usize {
    5
}

fn default_startup_secs() -> u64 {
    30
}

fn default_tool_secs() -> u64 {
    60
}

fn default_model_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
        }
    }
}

impl Default for AgentSectionConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_rounds: default_max_rounds(),
            history_window: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: default_startup_secs(),
            tool_secs: default_tool_secs(),
            model_secs: default_model_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_secs)
    }

    pub fn model(&self) -> Duration {
        Duration::from_secs(self.model_secs)
    }
}

impl AgentFileConfig {
    /// Load config from .agent.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .agent.toml
    /// 2. Check ~/.config/multiclient/.agent.toml (global fallback)
    /// 3. Fall back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(config_path) = find_config_file(".agent.toml") {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No .agent.toml found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        let config: AgentFileConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "agent.max_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent.history_window == Some(0) {
            return Err(ConfigError::InvalidSetting {
                key: "agent.history_window",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        let timeouts = [
            ("timeouts.startup_secs", self.timeouts.startup_secs),
            ("timeouts.tool_secs", self.timeouts.tool_secs),
            ("timeouts.model_secs", self.timeouts.model_secs),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::InvalidSetting {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
