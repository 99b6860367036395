//! # graphetl CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `sample` - Write deterministic sample record files
//! - `run` - Load records and run the pipeline
//! - `status` - Show node and edge counts
//! - `customer` - Show one customer node and its similar customers
//! - `similar` - List customers similar to one customer
//! - `export` - Export the graph or the similarity projection
//! - `import` - Replace the graph with a canonical export
//! - `hash` - Compute the canonical checksum and BLAKE3 hash of the graph

mod commands;

use crate::config::{Backend, Config, DEFAULT_CONFIG_FILE, Overrides, parse_policy};
use clap::{Parser, Subcommand, ValueEnum};
use graphetl_core::{AnalyticsPolicy, EtlError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// graphetl - customer/product/order graph pipeline
///
/// Loads customer, product and order records into a property graph,
/// derives customer similarity and product co-purchase relationships,
/// and writes per-customer spending metrics.
#[derive(Parser, Debug)]
#[command(name = "graphetl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (when RUST_LOG is not set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to the graph database (overrides the configuration file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the configuration file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output formats of `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Binary canonical format with header and checksum
    Canonical,
    /// Every node and edge as pretty JSON
    Json,
    /// Customer nodes and similarity edges as pretty JSON
    Projection,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Write deterministic sample record files
    Sample {
        /// Output directory
        #[arg(short, long, default_value = "data")]
        out: PathBuf,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Number of customers
        #[arg(long, default_value = "100")]
        customers: u64,

        /// Number of products
        #[arg(long, default_value = "20")]
        products: u64,

        /// Number of orders
        #[arg(long, default_value = "200")]
        orders: u64,
    },

    /// Load records and run the pipeline
    Run {
        /// Use generated sample data instead of record files
        #[arg(long)]
        sample: bool,

        /// Seed for --sample
        #[arg(long, default_value = "42", requires = "sample")]
        seed: u64,

        /// Directory holding customers.json, products.json and orders.json
        #[arg(short, long, conflicts_with = "sample")]
        input: Option<PathBuf>,

        /// Do not clear the graph before loading
        #[arg(long)]
        keep_existing: bool,

        /// Analytics policy: skip, report or abort
        #[arg(long, value_parser = parse_policy)]
        analytics: Option<AnalyticsPolicy>,
    },

    /// Show node and edge counts
    Status,

    /// Show one customer node and its similar customers
    Customer {
        /// Customer id
        id: u64,
    },

    /// List customers similar to one customer, strongest first
    Similar {
        /// Customer id
        id: u64,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Export the graph
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format
        #[arg(short = 't', long, value_enum, default_value = "canonical")]
        format: ExportFormat,
    },

    /// Replace the graph with a canonical export
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compute the canonical checksum and BLAKE3 hash of the graph
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve the configuration: file (or defaults) plus command line overrides.
pub fn resolve_config(cli: &Cli) -> Result<Config, EtlError> {
    let mut config = Config::load_or_default(&cli.config)?;
    let mut overrides = Overrides {
        database: cli.database.clone(),
        backend: cli.backend,
        ..Overrides::default()
    };
    if let Some(Commands::Run {
        input,
        keep_existing,
        analytics,
        ..
    }) = &cli.command
    {
        overrides.analytics = *analytics;
        overrides.keep_existing = *keep_existing;
        if let Some(dir) = input {
            config.input = crate::config::InputConfig::in_dir(dir);
        }
    }
    config.apply_overrides(&overrides);
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), EtlError> {
    let config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Sample {
            out,
            seed,
            customers,
            products,
            orders,
        }) => cmd_sample(
            &out,
            &crate::sample::SampleSpec {
                seed,
                customers,
                products,
                orders,
            },
            json_mode,
        ),
        Some(Commands::Run { sample, seed, .. }) => {
            let seed = sample.then_some(seed);
            cmd_run(&config, seed, json_mode).map(|_| ())
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Customer { id }) => cmd_customer(&config, id, json_mode),
        Some(Commands::Similar { id, limit }) => cmd_similar(&config, id, limit, json_mode),
        Some(Commands::Export { output, format }) => cmd_export(&config, &output, format),
        Some(Commands::Import { input }) => cmd_import(&config, &input),
        Some(Commands::Hash) => cmd_hash(&config, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}
