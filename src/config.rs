//! Collector configuration from environment variables

use std::collections::HashSet;
use std::env;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Bucket counts for the download rollups.
///
/// Downstream charting assumes fixed-length series, so these counts are
/// honored exactly regardless of how sparse the download data is.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub weeks: usize,
    pub months: usize,
    pub years: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            weeks: 54 * 4,
            months: 12 * 4,
            years: 4,
        }
    }
}

/// Configuration for the collector runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding idempotent schema .sql files
    pub schema_dir: String,

    /// Base URL of the package registry (metadata + dependents)
    pub registry_url: String,

    /// Base URL of the download-counts API
    pub downloads_url: String,

    /// Package name every crawl cycle starts from
    pub root_package: String,

    /// Seconds to sleep between crawl cycles
    pub interval_secs: u64,

    /// Packages whose dependents are crawled one level further
    pub fanout_allowlist: HashSet<String>,

    /// Rollup bucket counts (weeks / months / years)
    pub buckets: BucketConfig,

    /// Hard ceiling on packages visited in one traversal
    pub max_crawl_nodes: usize,

    /// Per-request HTTP deadline in seconds
    pub http_timeout_secs: u64,
}

impl CollectorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PKGINTEL_DB_PATH` (default: pkgintel.db)
    /// - `PKGINTEL_SCHEMA_DIR` (default: sql)
    /// - `PKGINTEL_REGISTRY_URL` (default: https://registry.npmjs.org)
    /// - `PKGINTEL_DOWNLOADS_URL` (default: https://api.npmjs.org)
    /// - `PKGINTEL_ROOT_PACKAGE` (default: mongodb)
    /// - `PKGINTEL_INTERVAL_SECS` (default: 86400)
    /// - `PKGINTEL_FANOUT_ALLOWLIST` (comma-separated, default: mongoose)
    /// - `PKGINTEL_WEEK_BUCKETS` (default: 216)
    /// - `PKGINTEL_MONTH_BUCKETS` (default: 48)
    /// - `PKGINTEL_YEAR_BUCKETS` (default: 4)
    /// - `PKGINTEL_MAX_CRAWL_NODES` (default: 5000)
    /// - `PKGINTEL_HTTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = BucketConfig::default();

        let config = Self {
            db_path: env::var("PKGINTEL_DB_PATH").unwrap_or_else(|_| "pkgintel.db".to_string()),

            schema_dir: env::var("PKGINTEL_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            registry_url: env::var("PKGINTEL_REGISTRY_URL")
                .unwrap_or_else(|_| "https://registry.npmjs.org".to_string()),

            downloads_url: env::var("PKGINTEL_DOWNLOADS_URL")
                .unwrap_or_else(|_| "https://api.npmjs.org".to_string()),

            root_package: env::var("PKGINTEL_ROOT_PACKAGE")
                .unwrap_or_else(|_| "mongodb".to_string()),

            interval_secs: parse_env("PKGINTEL_INTERVAL_SECS", 86_400),

            fanout_allowlist: env::var("PKGINTEL_FANOUT_ALLOWLIST")
                .unwrap_or_else(|_| "mongoose".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            buckets: BucketConfig {
                weeks: parse_env("PKGINTEL_WEEK_BUCKETS", defaults.weeks),
                months: parse_env("PKGINTEL_MONTH_BUCKETS", defaults.months),
                years: parse_env("PKGINTEL_YEAR_BUCKETS", defaults.years),
            },

            max_crawl_nodes: parse_env("PKGINTEL_MAX_CRAWL_NODES", 5_000),

            http_timeout_secs: parse_env("PKGINTEL_HTTP_TIMEOUT_SECS", 30),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_package.is_empty() {
            return Err(ConfigError::InvalidValue(
                "root package name cannot be empty".to_string(),
            ));
        }

        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PKGINTEL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        if self.buckets.weeks == 0 || self.buckets.months == 0 || self.buckets.years == 0 {
            return Err(ConfigError::InvalidValue(
                "bucket counts must be greater than zero".to_string(),
            ));
        }

        if self.max_crawl_nodes == 0 {
            return Err(ConfigError::InvalidValue(
                "PKGINTEL_MAX_CRAWL_NODES must be greater than zero".to_string(),
            ));
        }

        if !self.registry_url.starts_with("http://") && !self.registry_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PKGINTEL_REGISTRY_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
