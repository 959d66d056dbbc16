//! Quire CLI - Command-line interface for Quire event logs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quire::prelude::*;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Root directory of the event store [default: ./data]
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Store configuration file (TOML); `--root` overrides its root
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append events to an aggregate
    Append {
        /// Aggregate id (UUID)
        aggregate_id: String,

        /// Version the events are appended after
        #[arg(short, long)]
        expected_version: u64,

        /// JSON-lines file of events to append [default: stdin]
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Print an aggregate's events as JSON lines
    Read {
        /// Aggregate id (UUID)
        aggregate_id: String,

        /// Skip events with a lower sequence
        #[arg(short, long, default_value_t = 0)]
        since: u64,
    },

    /// Show the state of an aggregate's log file
    Status {
        /// Aggregate id (UUID)
        aggregate_id: String,
    },
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StoreConfig::new("./data"),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let store = FileEventStore::open(config).context("Failed to open event store")?;

    // Execute command
    match cli.command {
        Commands::Append {
            aggregate_id,
            expected_version,
            input,
        } => {
            let id = commands::parse_id(&aggregate_id)?;
            commands::append::execute(&store, id, expected_version, input)?;
        }
        Commands::Read {
            aggregate_id,
            since,
        } => {
            let id = commands::parse_id(&aggregate_id)?;
            commands::read::execute(&store, id, since, &mut std::io::stdout().lock())?;
        }
        Commands::Status { aggregate_id } => {
            let id = commands::parse_id(&aggregate_id)?;
            commands::status::execute(&store, id)?;
        }
    }

    Ok(())
}
