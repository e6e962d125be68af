//! # linetrack - Production Line Monitor
//!
//! The main binary for the linetrack line model.
//!
//! This application provides:
//! - Simulated line runs with backpressured stage handoffs
//! - OEE-style efficiency reports from the recorded cycle log
//! - Live monitoring of a stage's entry and exit sensors
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 apps/linetrack (THE BINARY)                 │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌────────────────┐  │
//! │  │    CLI      │    │   Config    │    │  Live monitor  │  │
//! │  │   (clap)    │    │   (toml)    │    │ (tokio, JSONL) │  │
//! │  └──────┬──────┘    └──────┬──────┘    └───────┬────────┘  │
//! │         └──────────────────┼───────────────────┘           │
//! │                            ▼                               │
//! │                   ┌────────────────┐                       │
//! │                   │ linetrack-core │                       │
//! │                   │  (THE LOGIC)   │                       │
//! │                   └────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! linetrack init
//! linetrack run
//! linetrack report --stage 1
//! linetrack monitor --stage 0 --input events.jsonl
//! ```

use clap::Parser;
use linetrack::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // LINETRACK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("LINETRACK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "linetrack=debug,linetrack_core=debug"
    } else {
        "linetrack=info,linetrack_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  linetrack v{}
  [stage] -> [stage] -> [stage]   cycle times, rates, OEE
"#,
        env!("CARGO_PKG_VERSION")
    );
}
