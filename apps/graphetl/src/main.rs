//! # graphetl
//!
//! The command line binary for the graphetl pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Generate sample records and run the pipeline on them
//! graphetl sample --out data --seed 42
//! graphetl run
//!
//! # Or in one step, into an in-memory snapshot
//! graphetl -B memory -D graph.getx run --sample
//!
//! # Inspect the result
//! graphetl status
//! graphetl similar 17 --limit 5
//! graphetl export -t projection -o projection.json
//! ```

use clap::Parser;
use graphetl::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // GRAPHETL_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("GRAPHETL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "graphetl=debug,graphetl_core=debug"
    } else {
        "graphetl=info,graphetl_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so command output on stdout stays parseable.
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

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!("graphetl v{}", env!("CARGO_PKG_VERSION"));
    println!("customers -> products -> orders -> graph");
    println!();
}
