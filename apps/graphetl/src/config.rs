//! # Configuration
//!
//! Optional `graphetl.toml` file. Every section and key may be omitted;
//! missing values take the defaults below, and command line flags override
//! whatever the file says.
//!
//! ```toml
//! [database]
//! path = "graphetl.db"
//! backend = "redb"        # "redb" | "memory"
//!
//! [pipeline]
//! clear_before_load = true
//! analytics = "report"    # "skip" | "report" | "abort"
//!
//! [input]
//! customers = "data/customers.json"
//! products = "data/products.json"
//! orders = "data/orders.json"
//!
//! [analytics]
//! command = ["python3", "gds_bridge.py"]
//! ```

use clap::ValueEnum;
use graphetl_core::{AnalyticsPolicy, EtlError, PipelineOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "graphetl.toml";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Where the graph sink lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// redb database file (ACID, persistent).
    #[default]
    Redb,
    /// In-memory graph, gone when the process exits.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => f.write_str("redb"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub backend: Backend,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("graphetl.db"),
            backend: Backend::Redb,
        }
    }
}

/// Record file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub customers: PathBuf,
    pub products: PathBuf,
    pub orders: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self::in_dir(Path::new("data"))
    }
}

impl InputConfig {
    /// The three standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            customers: dir.join("customers.json"),
            products: dir.join("products.json"),
            orders: dir.join("orders.json"),
        }
    }
}

/// External analytics collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Program and arguments. When absent, every algorithm reports the
    /// collaborator as unavailable.
    pub command: Option<Vec<String>>,
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pipeline: PipelineOptions,
    pub input: InputConfig,
    pub analytics: AnalyticsConfig,
}

impl Config {
    /// Parse a configuration document.
    pub fn parse(text: &str) -> Result<Self, EtlError> {
        toml::from_str(text)
            .map_err(|e| EtlError::SerializationError(format!("Invalid configuration: {}", e)))
    }

    /// Load `path`, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, EtlError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let metadata = std::fs::metadata(path)
            .map_err(|e| EtlError::IoError(format!("Cannot read file metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(EtlError::SerializationError(format!(
                "Configuration file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| EtlError::IoError(format!("Read config '{}': {}", path.display(), e)))?;
        let config = Self::parse(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply command line overrides. `None` keeps the file value.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(path) = &overrides.database {
            self.database.path = path.clone();
        }
        if let Some(backend) = overrides.backend {
            self.database.backend = backend;
        }
        if let Some(policy) = overrides.analytics {
            self.pipeline.analytics = policy;
        }
        if overrides.keep_existing {
            self.pipeline.clear_before_load = false;
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub analytics: Option<AnalyticsPolicy>,
    pub keep_existing: bool,
}

/// clap value parser for `--analytics`.
pub fn parse_policy(value: &str) -> Result<AnalyticsPolicy, String> {
    match value {
        "skip" => Ok(AnalyticsPolicy::Skip),
        "report" => Ok(AnalyticsPolicy::Report),
        "abort" => Ok(AnalyticsPolicy::Abort),
        other => Err(format!(
            "unknown analytics policy '{}'. Use: skip, report, abort",
            other
        )),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("graphetl.db"));
        assert_eq!(config.database.backend, Backend::Redb);
        assert!(config.pipeline.clear_before_load);
        assert_eq!(config.pipeline.analytics, AnalyticsPolicy::Skip);
        assert_eq!(config.input.orders, PathBuf::from("data/orders.json"));
        assert!(config.analytics.command.is_none());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::parse(
            r#"
            [database]
            backend = "memory"

            [pipeline]
            analytics = "abort"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.backend, Backend::Memory);
        assert_eq!(config.database.path, PathBuf::from("graphetl.db"));
        assert_eq!(config.pipeline.analytics, AnalyticsPolicy::Abort);
        assert!(config.pipeline.clear_before_load);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(Config::parse("[database]\nbackedn = \"redb\"\n").is_err());
        assert!(Config::parse("[pipeline]\nanalytics = \"sometimes\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let config = Config::load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config = Config::parse(
            "[database]\npath = \"file.db\"\nbackend = \"memory\"\n[pipeline]\nanalytics = \"report\"\n",
        )
        .unwrap();
        config.apply_overrides(&Overrides {
            database: Some(PathBuf::from("cli.db")),
            backend: None,
            analytics: Some(AnalyticsPolicy::Skip),
            keep_existing: true,
        });
        assert_eq!(config.database.path, PathBuf::from("cli.db"));
        assert_eq!(config.database.backend, Backend::Memory);
        assert_eq!(config.pipeline.analytics, AnalyticsPolicy::Skip);
        assert!(!config.pipeline.clear_before_load);
    }

    #[test]
    fn policy_parser() {
        assert_eq!(parse_policy("report"), Ok(AnalyticsPolicy::Report));
        assert!(parse_policy("REPORT").is_err());
    }
}
