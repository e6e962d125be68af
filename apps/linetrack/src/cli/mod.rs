//! # linetrack CLI Module
//!
//! This module implements the CLI interface for linetrack.
//!
//! ## Available Commands
//!
//! - `init` - Create the database and register the configured stages
//! - `run` - Simulate a run and report on it
//! - `report` - Efficiency report for recorded cycles
//! - `monitor` - Live monitoring from sensor events
//! - `clear` - Delete recorded cycles
//! - `status` - Registered stages and record counts

mod commands;

use crate::config::{BackendKind, CliOverrides, DEFAULT_CONFIG_FILE, load_config};
use clap::{Parser, Subcommand};
use linetrack_core::LineError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// linetrack - production line monitor
///
/// Records stage cycle times and reports how close the line runs to its
/// design speed.
#[derive(Parser, Debug)]
#[command(name = "linetrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML line configuration
    #[arg(short = 'c', long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to the cycle database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and register the configured stages
    Init {
        /// Recreate the database even if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Run the configured items through the line and report
    Run {
        /// Wait out processing times on the wall clock
        #[arg(long)]
        realtime: bool,

        /// Keep records of earlier runs
        #[arg(long)]
        keep: bool,
    },

    /// Efficiency report for recorded cycles
    Report {
        /// Stage to report on (all stages if omitted)
        #[arg(short, long)]
        stage: Option<u32>,

        /// Only cycles exiting at or after this time (ms since epoch); defaults to the last run start
        #[arg(long)]
        since: Option<i64>,
    },

    /// Monitor a stage from JSON-lines sensor events
    Monitor {
        /// Stage the sensors belong to
        #[arg(short, long)]
        stage: u32,

        /// Event file (standard input if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Delete recorded cycles
    Clear {
        /// Stage to clear (all stages if omitted)
        #[arg(short, long)]
        stage: Option<u32>,
    },

    /// Show registered stages and record counts
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), LineError> {
    let overrides = CliOverrides {
        database: cli.database.clone(),
        backend: cli.backend,
    };
    let config = load_config(&cli.config, &overrides)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Run { realtime, keep }) => cmd_run(&config, json_mode, realtime, keep).await,
        Some(Commands::Report { stage, since }) => cmd_report(&config, json_mode, stage, since),
        Some(Commands::Monitor { stage, input }) => {
            cmd_monitor(&config, json_mode, stage, input).await
        }
        Some(Commands::Clear { stage }) => cmd_clear(&config, json_mode, stage),
        Some(Commands::Status) => cmd_status(&config, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}
