//! cybermem CLI: the main entry point.
//!
//! Commands:
//! - `init`   , Create config, namespace roots and the identity file
//! - `doctor` , Diagnose config and store health
//! - `memory` , Inspect, select from and clean up working memory
//! - `tools`  , Show the tool surface handed to scripts

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "cybermem",
    about = "cybermem: working memory for autonomous agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.cybermem/config.toml
    #[arg(short, long, global = true, env = "CYBERMEM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the namespace roots
    Init,

    /// Diagnose config and store health
    Doctor,

    /// Working-memory commands
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Print the script tool definitions as JSON
    Tools,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show registry, cache and snapshot statistics
    Stats,

    /// List registered blocks
    List {
        /// Only blocks of this content type (e.g. knowledge, text/markdown)
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
    },

    /// Run a selection pass and show what would reach the reasoner
    Select {
        /// Task keywords to score against
        keywords: Vec<String>,

        /// Override the configured strategy (balanced, recent, relevant)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Override the configured token budget
        #[arg(short, long)]
        max_tokens: Option<usize>,

        /// Print the rendered context instead of the selection summary
        #[arg(long)]
        render: bool,
    },

    /// Drop expired blocks and write a fresh snapshot
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init => commands::init::run(config).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::memory::stats(config).await?,
            MemoryAction::List { content_type } => {
                commands::memory::list(config, content_type.as_deref()).await?
            }
            MemoryAction::Select {
                keywords,
                strategy,
                max_tokens,
                render,
            } => {
                let overrides = commands::memory::SelectOverrides {
                    strategy,
                    max_tokens,
                    render,
                };
                commands::memory::select(config, &keywords, overrides).await?
            }
            MemoryAction::Cleanup => commands::memory::cleanup(config).await?,
        },
        Commands::Tools => commands::tools::run(config).await?,
    }

    Ok(())
}
