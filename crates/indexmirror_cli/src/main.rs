//! indexmirror CLI
//!
//! Command-line runner for the subgraph mirror.
//!
//! # Commands
//!
//! - `run` - Load a snapshot and follow deltas until interrupted
//! - `snapshot` - Perform one full load and print cache statistics
//! - `probe` - Print the remote checkpoint

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mirror a subgraph into memory and keep it current.
#[derive(Parser)]
#[command(name = "indexmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subgraph GraphQL endpoint
    #[arg(global = true, short, long, env = "SUBGRAPH_URL")]
    endpoint: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a snapshot and follow deltas until interrupted
    Run {
        /// Seconds between delta attempts
        #[arg(short, long, env = "UPDATE_INTERVAL_SECS", default_value = "30")]
        interval: u64,

        /// File to restore tracker state from and save it to on exit
        #[arg(short, long)]
        state_file: Option<PathBuf>,

        /// Seconds between status log lines (0 disables)
        #[arg(long, default_value = "60")]
        status_every: u64,

        /// Records requested per kind in the snapshot
        #[arg(long, env = "PAGE_SIZE", default_value = "1000")]
        page_size: u32,
    },

    /// Perform one full load and print cache statistics
    Snapshot {
        /// Only report this entity kind
        #[arg(short, long)]
        kind: Option<String>,

        /// Records requested per kind
        #[arg(long, env = "PAGE_SIZE", default_value = "1000")]
        page_size: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the remote checkpoint
    Probe {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            interval,
            state_file,
            status_every,
            page_size,
        } => {
            let endpoint = cli.endpoint.ok_or("Subgraph endpoint required for run")?;
            let options = commands::run::RunOptions {
                interval,
                state_file,
                status_every,
                page_size,
            };
            commands::run::run(&endpoint, options).await?;
        }
        Commands::Snapshot {
            kind,
            page_size,
            format,
        } => {
            let endpoint = cli.endpoint.ok_or("Subgraph endpoint required for snapshot")?;
            commands::snapshot::run(&endpoint, kind.as_deref(), page_size, &format).await?;
        }
        Commands::Probe { format } => {
            let endpoint = cli.endpoint.ok_or("Subgraph endpoint required for probe")?;
            commands::probe::run(&endpoint, &format).await?;
        }
        Commands::Version => {
            println!("indexmirror v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
