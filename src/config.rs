//! Configuration management for the changeset query core.
//!
//! Configuration is loaded from multiple sources, later ones overriding
//! earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/osm-changesets/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `OSM_CHANGESETS_`)
//! 5. Command-line arguments
//!
//! # Environment Variables
//!
//! Sections and keys are separated by a double underscore:
//! - `OSM_CHANGESETS_PARTITIONS__TEMPLATE` - partition location template
//! - `OSM_CHANGESETS_PARTITIONS__GRANULARITY` - `year`, `month` or `day`
//! - `OSM_CHANGESETS_ENGINE__TIMEOUT_SECS` - per-query deadline
//! - `OSM_CHANGESETS_CACHE__ENABLED` - enable/disable result caching

use crate::error::Result;
use crate::partition::Granularity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const SYSTEM_CONFIG: &str = "/etc/osm-changesets/config.toml";
const ENV_PREFIX: &str = "OSM_CHANGESETS";

/// Complete core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Partition layout of the remote dataset
    pub partitions: PartitionSettings,
    /// Embedded engine settings
    #[serde(default)]
    pub engine: EngineSettings,
    /// Result cache settings
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Where partitions live and which of them may be enumerated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSettings {
    /// Location template with `{year}`, `{month}`, `{day}` placeholders
    pub template: String,
    /// Calendar unit covered by one file
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    /// First day the dataset can contain
    #[serde(default = "default_earliest")]
    pub earliest: NaiveDate,
    /// Last day the dataset can contain (today, UTC, when unset)
    #[serde(default)]
    pub latest: Option<NaiveDate>,
    /// Maximum number of partitions enumerated for the `all` scope
    #[serde(default = "default_max_lookback")]
    pub max_lookback: u32,
}

/// Embedded engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// DuckDB database path, `:memory:` for an in-process database
    #[serde(default = "default_database")]
    pub database: String,
    /// Extensions installed and loaded at startup (e.g. `httpfs`)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// `SET key = 'value'` statements applied at startup
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Deadline for one query execution, including the partition retry
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Engine worker threads (engine default when unset)
    #[serde(default)]
    pub threads: Option<usize>,
}

impl EngineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            database: default_database(),
            extensions: default_extensions(),
            settings: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            threads: None,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Enable result caching
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Entry lifetime in seconds, 0 to keep entries until invalidated
    #[serde(default)]
    pub ttl_secs: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: 0,
        }
    }
}

impl CoreConfig {
    /// Load configuration from all sources using the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_path, None)
    }

    /// Load configuration, reading environment overrides from `env` instead
    /// of the process environment when given.
    pub fn load_with_env(
        config_path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name(SYSTEM_CONFIG).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: CoreConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Parse configuration from TOML text layered over the embedded defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CoreConfig = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Apply a runtime override of the partition template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.partitions.template = template.into();
        self
    }
}

fn default_granularity() -> Granularity {
    Granularity::Year
}

fn default_earliest() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_max_lookback() -> u32 {
    30
}

fn default_database() -> String {
    ":memory:".to_owned()
}

fn default_extensions() -> Vec<String> {
    vec!["httpfs".to_owned()]
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_cache_enabled() -> bool {
    true
}
