mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use memorial::config::MemorialConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memorial", version, about = "Memorial records service with owned image storage")]
struct Cli {
    /// Config file (default: ~/.memorial/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Delete bucket images no memorial references
    Cleanup {
        /// List orphaned images without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// List stored memorials
    List,
    /// Show full details for one memorial
    Inspect {
        /// Memorial ID
        id: String,
    },
    /// Check database and bucket health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => MemorialConfig::load_from(path)?,
        None => MemorialConfig::load()?,
    };

    // Log to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => memorial::server::serve(config).await?,
        Command::Cleanup { dry_run } => cli::cleanup::cleanup(config, dry_run).await?,
        Command::List => cli::list::list(&config)?,
        Command::Inspect { id } => cli::inspect::inspect(&config, &id)?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
    }

    Ok(())
}
