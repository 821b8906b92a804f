//! DataLayer CLI
//!
//! Command-line inspection of configured datasets.
//!
//! # Commands
//!
//! - `units` - List datasets with their source units and metadata
//! - `changes` - Print entities changed after a since value
//! - `entities` - Print all entities, optionally resuming from a token
//!
//! Entities are printed to stdout as JSON lines; logs, including the token to
//! continue from, go to stderr.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::read::ReadMode;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inspect datalayer datasets.
#[derive(Parser)]
#[command(name = "datalayer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the dataset definitions file (JSON)
    #[arg(global = true, short, long, default_value = "datalayer.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List datasets with their source units and metadata
    Units {
        /// Only show this dataset
        dataset: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print entities changed after a since value
    Changes {
        /// Dataset name
        dataset: String,

        /// Timestamp, marker or token to start after (empty: from the beginning)
        #[arg(short, long, default_value = "")]
        since: String,

        /// Maximum number of entities (0: no limit)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Only print the last version of each entity
        #[arg(long)]
        latest_only: bool,
    },

    /// Print all entities
    Entities {
        /// Dataset name
        dataset: String,

        /// Token to resume from
        #[arg(short, long, default_value = "")]
        from: String,

        /// Maximum number of entities (0: no limit)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Units { dataset, format } => {
            let registry = config::load_registry(&cli.config)?;
            commands::units::run(&registry, dataset.as_deref(), &format, &mut out)?;
        }
        Commands::Changes {
            dataset,
            since,
            limit,
            latest_only,
        } => {
            let registry = config::load_registry(&cli.config)?;
            let mode = ReadMode::Changes {
                since,
                limit,
                latest_only,
            };
            commands::read::run(&*registry.dataset(&dataset)?, &mode, &mut out)?;
        }
        Commands::Entities {
            dataset,
            from,
            limit,
        } => {
            let registry = config::load_registry(&cli.config)?;
            let mode = ReadMode::Entities { from, limit };
            commands::read::run(&*registry.dataset(&dataset)?, &mode, &mut out)?;
        }
        Commands::Version => {
            writeln!(out, "DataLayer CLI v{}", env!("CARGO_PKG_VERSION"))?;
            writeln!(out, "DataLayer Core v{}", datalayer_core::VERSION)?;
        }
    }

    Ok(())
}
