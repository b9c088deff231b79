//! Refresher configuration.
//!
//! Settings come from an optional `newsmap.{toml,yaml,json}` file overlaid by
//! `NEWSMAP__*` environment variables:
//!
//! ```toml
//! crawler_interval_secs = 3600
//! vector_ttl_secs = 86400
//! vector_dimensions = 1024
//! database_path = "data/newsmap.redb"
//! log_level = "info"
//! log_format = "json"
//!
//! [layout]
//! n_neighbors = 15
//! seed = 42
//! ```
//!
//! The `(hours, min_similarity)` grid is fixed in [`crate::grid`] and is not
//! configurable.

use layout::LayoutConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "NEWSMAP";
const DEFAULT_FILE: &str = "newsmap";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Log output format for the refresher binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Refresh pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Base crawl interval in seconds. Refresh cycles run four times per interval.
    #[serde(default = "default_crawler_interval_secs")]
    pub crawler_interval_secs: u64,

    /// Vector retention window in seconds; also bounds the sync cutoff.
    #[serde(default = "default_vector_ttl_secs")]
    pub vector_ttl_secs: u64,

    /// Embedding dimensionality.
    #[serde(default = "default_vector_dimensions")]
    pub vector_dimensions: usize,

    /// redb file for the relational store. Empty selects the in-memory backend.
    #[serde(default = "default_database_path")]
    pub database_path: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            crawler_interval_secs: default_crawler_interval_secs(),
            vector_ttl_secs: default_vector_ttl_secs(),
            vector_dimensions: default_vector_dimensions(),
            database_path: default_database_path(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl RefreshConfig {
    /// Load from `path` (or `newsmap.*` in the working directory when `None`)
    /// and the process environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigLoadError> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    pub(crate) fn load_with_env(
        path: Option<&str>,
        env: config::Environment,
    ) -> Result<Self, ConfigLoadError> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_FILE).required(false),
        };
        let cfg: RefreshConfig = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.vector_dimensions == 0 {
            return Err(ConfigLoadError::Validation(
                "vector_dimensions must be greater than 0".into(),
            ));
        }
        if self.crawler_interval_secs < 4 {
            return Err(ConfigLoadError::Validation(format!(
                "crawler_interval_secs must be at least 4, got {}",
                self.crawler_interval_secs
            )));
        }
        if self.vector_ttl_secs < 3600 {
            return Err(ConfigLoadError::Validation(format!(
                "vector_ttl_secs must be at least 3600, got {}",
                self.vector_ttl_secs
            )));
        }
        if self.layout.n_neighbors == 0 {
            return Err(ConfigLoadError::Validation(
                "layout.n_neighbors must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Sleep between refresh cycles: a quarter of the crawl interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.crawler_interval_secs / 4)
    }

    /// Whole hours of the sync window.
    pub fn sync_window_hours(&self) -> i64 {
        (self.vector_ttl_secs / 3600) as i64
    }

    pub fn vector_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.vector_ttl_secs as i64)
    }

    /// The redb path, if one is configured.
    pub fn database_path(&self) -> Option<&str> {
        self.database_path.as_deref().filter(|p| !p.trim().is_empty())
    }
}

fn default_crawler_interval_secs() -> u64 {
    3600
}

fn default_vector_ttl_secs() -> u64 {
    86_400
}

fn default_vector_dimensions() -> usize {
    1024
}

fn default_database_path() -> Option<String> {
    Some("data/newsmap.redb".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}
