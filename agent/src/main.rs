use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multiclient::agent::{event_channel, AgentEvent, EventReceiver};
use multiclient::config::{AgentFileConfig, McpConfig};
use multiclient::llm::OllamaModel;
use multiclient::mcp::{split_qualified, McpMultiClient, StartupOutcome, StdioLauncher};
use multiclient::session::{ChatSession, SessionConfig};

#[derive(Parser)]
#[command(name = "multiclient")]
#[command(about = "Chat agent that orchestrates tools from multiple MCP servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ollama server URL (default: from .agent.toml)
    #[arg(long, env = "OLLAMA_URL", global = true)]
    ollama_url: Option<String>,

    /// Model to use (default: from .agent.toml)
    #[arg(short = 'm', long, env = "OLLAMA_MODEL", global = true)]
    model: Option<String>,

    /// Path to .mcp.json (default: MCP_CONFIG_PATH, then directory search)
    #[arg(long, global = true)]
    mcp_config: Option<PathBuf>,

    /// Path to .agent.toml
    #[arg(long, global = true)]
    agent_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session with all MCP tools
    Chat {
        /// System prompt for the agent
        #[arg(long, short)]
        system: Option<String>,
        /// Print tool calls as they happen
        #[arg(long)]
        verbose: bool,
    },
    /// Send a single message and print the answer
    Ask {
        message: String,
        #[arg(long, short)]
        system: Option<String>,
    },
    /// List namespaced tools from every MCP server
    Tools {
        /// Only list tools from a specific server
        #[arg(long)]
        server: Option<String>,
    },
    /// Start every MCP server and report its status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Chat { system, verbose } => run_chat(config, system, verbose).await,
        Commands::Ask { message, system } => run_ask(config, &message, system).await,
        Commands::Tools { server } => run_tools(config, server).await,
        Commands::Status => run_status(config).await,
    }
}

/// Merge config files with command-line overrides
fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let backends = match &cli.mcp_config {
        Some(path) => McpConfig::load_from_path(path)?.descriptors()?,
        None => match McpConfig::load()? {
            Some(config) => config.descriptors()?,
            None => Vec::new(),
        },
    };

    let mut agent = match &cli.agent_config {
        Some(path) => AgentFileConfig::load_from_path(path)?,
        None => AgentFileConfig::load()?,
    };
    if let Some(url) = &cli.ollama_url {
        agent.llm.url = url.clone();
    }
    if let Some(model) = &cli.model {
        agent.llm.model = model.clone();
    }

    Ok(SessionConfig { backends, agent })
}

async fn start_session(mut config: SessionConfig, system: Option<String>) -> Result<ChatSession> {
    if system.is_some() {
        config.agent.agent.system_prompt = system;
    }
    ChatSession::start(config)
        .await
        .context("Failed to start MCP servers")
}

async fn run_chat(config: SessionConfig, system: Option<String>, verbose: bool) -> Result<()> {
    let mut session = start_session(config, system).await?;

    if let Some(report) = session.startup_report() {
        println!("MCP servers: {}", report);
    }
    println!(
        "Model: {} ({} tools). Type 'quit' to exit.",
        session.conversation().model(),
        session.orchestrator().registry().await.len()
    );
    println!();

    let printer = if verbose {
        let (tx, rx) = event_channel();
        session.set_event_sender(Some(tx));
        Some(tokio::spawn(print_events(rx)))
    } else {
        None
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input == "quit" || input == "exit" {
            break;
        }

        let response = session.handle_message(input).await;
        println!("\n{}\n", response);
    }

    session.set_event_sender(None);
    finish_printer(printer).await;
    session.end().await?;
    Ok(())
}

/// Wait for the event printer to drain; a panicked printer is logged, not fatal
async fn finish_printer(printer: Option<JoinHandle<()>>) {
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::warn!("Event printer task failed: {}", e);
        }
    }
}

async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ToolStart { name, arguments } => eprintln!("  → {} {}", name, arguments),
            AgentEvent::ToolComplete {
                name,
                duration,
                is_error,
                ..
            } => eprintln!(
                "  ← {} ({}ms{})",
                name,
                duration.as_millis(),
                if is_error { ", error" } else { "" }
            ),
            AgentEvent::Error { message } => eprintln!("  ! {}", message),
            _ => {}
        }
    }
}

async fn run_ask(config: SessionConfig, message: &str, system: Option<String>) -> Result<()> {
    let mut session = start_session(config, system).await?;
    let outcome = session.try_handle_message(message).await;
    session.end().await?;

    let answer = outcome?;
    println!("{}", answer);
    Ok(())
}

async fn start_orchestrator(config: &SessionConfig) -> Result<McpMultiClient> {
    let orchestrator = McpMultiClient::new(Arc::new(StdioLauncher::new()), config.timeouts());
    orchestrator
        .start_all(config.backends.clone())
        .await
        .context("Failed to start MCP servers")?;
    Ok(orchestrator)
}

async fn run_tools(config: SessionConfig, server_filter: Option<String>) -> Result<()> {
    let orchestrator = start_orchestrator(&config).await?;
    let registry = orchestrator.registry().await;

    let mut current_server = String::new();
    for tool in registry.describe_all() {
        let server = split_qualified(&tool.name)
            .map(|(backend, _)| backend)
            .unwrap_or_default()
            .to_string();
        if let Some(filter) = &server_filter {
            if &server != filter {
                continue;
            }
        }
        if server != current_server {
            println!("\n[{}]", server);
            current_server = server;
        }
        println!("  {}", tool.name);
        if !tool.description.is_empty() {
            println!("      {}", tool.description);
        }
    }
    println!();

    orchestrator.shutdown().await?;
    Ok(())
}

async fn run_status(config: SessionConfig) -> Result<()> {
    let ollama = OllamaModel::new(&config.agent.llm.url, &config.agent.llm.model);
    println!("LLM: {} at {}", config.agent.llm.model, ollama.base_url());

    let orchestrator = McpMultiClient::new(Arc::new(StdioLauncher::new()), config.timeouts());
    let report = match orchestrator.start_all(config.backends.clone()).await {
        Ok(report) => report,
        Err(multiclient::error::OrchestratorError::NoBackendsAvailable { report }) => report,
        Err(e) => return Err(e.into()),
    };

    if report.is_empty() {
        println!("No MCP servers configured");
    }
    for (name, outcome) in report.iter() {
        match outcome {
            StartupOutcome::Ready { tool_count } => {
                println!("  {:<20} ready    {} tools", name, tool_count)
            }
            StartupOutcome::Failed { reason } => println!("  {:<20} failed   {}", name, reason),
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
