//! MiniDB CLI
//!
//! Command-line tools for MiniDB database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display log statistics
//! - `verify` - Verify log integrity
//! - `compact` - Compact the log to reclaim space
//! - `dump` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MiniDB command-line database tools.
#[derive(Parser)]
#[command(name = "minidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display log statistics
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify log integrity
    Verify,

    /// Compact the log to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump log records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(path = ?cli.path, "starting");

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, cli.verbose)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, limit, format)?;
        }
        Commands::Version => {
            println!("MiniDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("MiniDB Core v{}", minidb_core::VERSION);
        }
    }

    Ok(())
}
