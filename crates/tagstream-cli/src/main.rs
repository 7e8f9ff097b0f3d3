//! Tagstream CLI - snapshot operations for a tagstream data directory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagstream::{TagstreamConfig, TagstreamDb};

mod commands;

#[derive(Parser)]
#[command(name = "tagstream")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build projection snapshots
    Build {
        /// Only build this projector
        #[arg(short, long)]
        projector: Option<String>,

        /// Rebuild from scratch regardless of thresholds
        #[arg(short, long)]
        force: bool,

        /// New events required before a rebuild
        #[arg(long)]
        min_events: Option<u64>,

        /// Show what would be built without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored snapshots
    List,

    /// Event log totals and snapshot freshness per projector
    Status,

    /// Delete one stored snapshot
    Delete {
        #[arg(short, long)]
        projector: String,

        #[arg(long)]
        projector_version: String,
    },
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
        .init();

    let config = match &cli.config {
        Some(path) => TagstreamConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TagstreamConfig::default(),
    };
    let db = TagstreamDb::open_with_config(&cli.data_dir, config)
        .with_context(|| format!("Failed to open data directory {}", cli.data_dir.display()))?;

    match cli.command {
        Commands::Build {
            projector,
            force,
            min_events,
            dry_run,
        } => {
            let args = commands::build::BuildArgs {
                projector,
                force,
                min_events,
                dry_run,
            };
            commands::build::execute(&db, &args)?;
        }
        Commands::List => {
            commands::list::execute(&db)?;
        }
        Commands::Status => {
            commands::status::execute(&db)?;
        }
        Commands::Delete {
            projector,
            projector_version,
        } => {
            commands::delete::execute(&db, &projector, &projector_version)?;
        }
    }

    Ok(())
}
