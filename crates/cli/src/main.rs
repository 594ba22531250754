//! kbsync CLI
//!
//! Keeps a vector index in sync with a directory of front-matter markdown
//! documents and answers questions over it.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{ChatCommand, HistoryCommand, SearchCommand, StatusCommand, SyncCommand};
use kbsync_core::config::{AppConfig, ConfigOverrides};
use kbsync_core::logging;
use std::path::PathBuf;

/// kbsync - knowledge-base reconciliation for vector search
#[derive(Parser, Debug)]
#[command(name = "kbsync")]
#[command(about = "Keep a vector index in sync with a markdown knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "KBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Document root (overrides the config file)
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,

    /// Index database file (overrides the config file)
    #[arg(long, global = true)]
    index_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the index with the content directory
    Sync(SyncCommand),

    /// Show index and record statistics
    Status(StatusCommand),

    /// Search the index without an LLM
    Search(SearchCommand),

    /// Ask a question within a session
    Chat(ChatCommand),

    /// Show or clear a session's conversation memory
    History(HistoryCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Sync(_) => "sync",
            Commands::Status(_) => "status",
            Commands::Search(_) => "search",
            Commands::Chat(_) => "chat",
            Commands::History(_) => "history",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let config = config.with_overrides(ConfigOverrides {
        content_dir: cli.content_dir,
        index_path: cli.index_path,
        log_level: cli.log_level,
        verbose: cli.verbose,
        no_color: cli.no_color,
        log_json: cli.log_json,
    });

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)
        .context("Failed to initialize logging")?;

    config.validate().context("Invalid configuration")?;

    tracing::info!("kbsync starting");
    tracing::debug!("Config file: {:?}", config.config_file);
    tracing::debug!("Content dir: {:?}", config.content.content_dir);
    tracing::debug!("Index path: {:?}", config.content.index_path);

    let command_name = cli.command.name();
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Sync(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::History(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.with_context(|| format!("kbsync {} failed", command_name))
}
