//! Relay CLI - chat with an LLM that can call tools on MCP servers
//!
//! Connects to every enabled server from the config, aggregates their tools
//! into one catalog, and runs an interactive chat session in which the model
//! may invoke those tools.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use relay_core::config::{Config, ConfigManager};
use relay_core::connection::connect_all;
use relay_core::provider::{GenAIProvider, ProviderType};
use relay_core::router::ToolRouter;
use relay_core::session::{Orchestrator, TurnOutcome, DEFAULT_SYSTEM_PROMPT};

#[derive(Parser)]
#[command(name = "relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat with an LLM that can use tools from MCP servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use for this session, overriding the configured default
    #[arg(short, long)]
    model: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session (default)
    Chat,

    /// List the tools exposed by the configured servers
    Tools,

    /// List the resources exposed by the configured servers
    Resources,

    /// Show the configured servers
    Servers,

    /// Show or change the configuration
    Config {
        /// Open the config file in $VISUAL/$EDITOR
        #[arg(long)]
        edit: bool,

        /// Persist a new default model identifier
        #[arg(long, value_name = "MODEL")]
        set_model: Option<String>,
    },
}

/// Keywords that end a chat session, matched case-insensitively
const EXIT_KEYWORDS: &[&str] = &["exit", "quit"];

fn is_exit_command(line: &str) -> bool {
    EXIT_KEYWORDS
        .iter()
        .any(|keyword| line.trim().eq_ignore_ascii_case(keyword))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Quiet by default so log lines don't interleave with the prompt
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "info,relay_core=debug,relay_mcp=debug"
        } else {
            "warn"
        })
        .init();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };

    match cli.command {
        None | Some(Commands::Chat) => run_chat(&config_manager, cli.model.as_deref()).await,
        Some(Commands::Tools) => show_tools(config_manager.config()).await,
        Some(Commands::Resources) => show_resources(config_manager.config()).await,
        Some(Commands::Servers) => {
            show_servers(config_manager.config());
            Ok(())
        }
        Some(Commands::Config { edit, set_model }) => {
            handle_config(config_manager, edit, set_model)
        }
    }
}

/// Connect the configured servers and build a refreshed router.
///
/// Returns None after printing a fatal message when no server is reachable;
/// per design, that message is the only visible output in that case.
async fn build_router(config: &Config) -> Option<ToolRouter> {
    if config.servers.is_empty() {
        eprintln!(
            "{}",
            style("No MCP servers configured. Add servers with `relay config --edit`.").red()
        );
        return None;
    }

    let connections = connect_all(config).await;
    if connections.is_empty() {
        eprintln!(
            "{}",
            style("No MCP servers could be reached; session not started.").red()
        );
        return None;
    }

    let mut router = ToolRouter::new(connections);
    router.refresh_catalog().await;
    Some(router)
}

fn build_provider(config: &Config, model_override: Option<&str>) -> Arc<GenAIProvider> {
    let provider_type = config
        .provider
        .provider_type
        .parse::<ProviderType>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: unknown provider '{}', defaulting to Anthropic",
                config.provider.provider_type
            );
            ProviderType::Anthropic
        });

    let model = model_override.unwrap_or(&config.provider.model);
    let api_key = config.provider.get_api_key();

    Arc::new(GenAIProvider::new(
        provider_type,
        api_key.as_deref(),
        Some(model),
    ))
}

async fn run_chat(config_manager: &ConfigManager, model_override: Option<&str>) -> anyhow::Result<()> {
    let config = config_manager.config();

    let Some(router) = build_router(config).await else {
        std::process::exit(1);
    };

    let provider = build_provider(config, model_override);
    let model = provider.model().to_string();

    let server_count = router.connection_count();
    let tool_count = router.catalog().len();

    let mut orchestrator = Orchestrator::new(provider, router, DEFAULT_SYSTEM_PROMPT)?;

    println!(
        "{} {} {} {} {} {}",
        style("relay").bold().cyan(),
        style("·").dim(),
        style(format!("{} server(s)", server_count)).dim(),
        style(format!("{} tool(s)", tool_count)).dim(),
        style("·").dim(),
        style(&model).dim(),
    );
    println!("{}", style("Type 'exit' or 'quit' to end the session.").dim());

    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline(&format!("{} ", style("you>").bold().blue())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!(error = %e, "readline failed");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }
        let _ = editor.add_history_entry(line);

        // Coarse cancellation: an interrupt mid-turn abandons the turn and
        // falls through to the orderly teardown below.
        tokio::select! {
            outcome = orchestrator.run_turn(line) => print_outcome(&outcome),
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    println!("{}", style("goodbye").dim());

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    for dispatch in &outcome.dispatches {
        let mark = if dispatch.ok {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {} {}", mark, style(&dispatch.tool).yellow());
    }
    println!(
        "{} {}",
        style("assistant>").bold().green(),
        outcome.reply
    );
}

async fn show_tools(config: &Config) -> anyhow::Result<()> {
    let Some(mut router) = build_router(config).await else {
        std::process::exit(1);
    };

    let catalog = router.catalog();
    if catalog.is_empty() {
        println!("No tools exposed by the connected servers.");
    } else {
        for tool in &catalog {
            println!(
                "{}  {}  {}",
                style(&tool.name).bold(),
                style(format!("[{}]", tool.server)).cyan(),
                style(&tool.description).dim(),
            );
        }
    }

    router.shutdown().await;
    Ok(())
}

async fn show_resources(config: &Config) -> anyhow::Result<()> {
    let Some(mut router) = build_router(config).await else {
        std::process::exit(1);
    };

    for connection in router.connections() {
        let info = connection.server_info();
        println!(
            "{}  {}",
            style(connection.name()).bold(),
            style(format!("{} {}", info.name, info.version)).dim(),
        );
        match connection.list_resources().await {
            Ok(resources) if resources.is_empty() => println!("  (no resources)"),
            Ok(resources) => {
                for resource in resources {
                    println!("  {}  {}", resource.uri, style(resource.name).dim());
                }
            }
            Err(e) if e.is_method_not_found() => println!("  (no resources)"),
            Err(e) => println!("  {}", style(format!("error: {}", e)).red()),
        }
    }

    router.shutdown().await;
    Ok(())
}

fn show_servers(config: &Config) {
    if config.servers.is_empty() {
        println!("No MCP servers configured.");
        return;
    }

    for (name, server) in &config.servers {
        let status = if server.enabled {
            style("enabled").green()
        } else {
            style("disabled").dim()
        };
        println!(
            "{}  {}  {}",
            style(name).bold(),
            status,
            style(server.transport_label()).dim(),
        );
    }
}

fn handle_config(
    mut config_manager: ConfigManager,
    edit: bool,
    set_model: Option<String>,
) -> anyhow::Result<()> {
    if let Some(model) = set_model {
        config_manager.set_default_model(&model);
        config_manager.save()?;
        println!("Default model set to {}", style(model).bold());
        return Ok(());
    }

    if edit {
        // Make sure there is a file to open
        if !config_manager.path().exists() {
            config_manager.save()?;
        }
        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string());
        let status = std::process::Command::new(&editor)
            .arg(config_manager.path())
            .status()?;
        if !status.success() {
            anyhow::bail!("editor '{}' exited with {}", editor, status);
        }
        return Ok(());
    }

    println!("{}", style(config_manager.path().display()).dim());
    println!("{}", config_manager.to_toml()?);
    Ok(())
}
