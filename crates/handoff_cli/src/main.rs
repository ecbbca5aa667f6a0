//! Handoff CLI
//!
//! Command-line tools for replaying handoff scenarios.
//!
//! # Commands
//!
//! - `simulate` - Resolve a scenario's events and print the settled state
//! - `keys` - List a scenario's event keys in write order

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Handoff resolution tools.
#[derive(Parser)]
#[command(name = "handoff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the scenario file (JSON)
    #[arg(global = true, short, long)]
    scenario: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a scenario's events and print the settled state
    Simulate {
        /// Minimum number of ticks to run
        #[arg(short, long, default_value = "1")]
        ticks: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List a scenario's event keys in write order
    Keys {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate { ticks, format } => {
            let path = cli.scenario.ok_or("Scenario path required for simulate")?;
            commands::simulate::run(&path, ticks, &format)?;
        }
        Commands::Keys { format } => {
            let path = cli.scenario.ok_or("Scenario path required for keys")?;
            commands::keys::run(&path, &format)?;
        }
        Commands::Version => {
            println!("Handoff CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
