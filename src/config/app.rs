//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::{DEFAULT_INTERVAL, MIN_INTERVAL};
use crate::retention::{DEFAULT_MAX_AGE_DAYS, DEFAULT_MAX_BLOCKS, RetentionPolicy};
use crate::source::SourceConfig;
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;

use super::validation::{ConfigError, expand_env_vars};

/// Default database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/blocks.db?mode=rwc";

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_autostart() -> bool {
    true
}

fn default_max_blocks() -> u32 {
    DEFAULT_MAX_BLOCKS
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_source() -> SourceConfig {
    SourceConfig::new("")
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL or file path.
    pub url: String,

    /// Connection pool size (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// =============================================================================
// Collector Configuration
// =============================================================================

/// Collection schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Interval between scheduled cycles (default: 30s, minimum: 5s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Start the scheduler with the service (default: true).
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            autostart: true,
        }
    }
}

// =============================================================================
// Retention Configuration
// =============================================================================

/// Retention thresholds. Zero disables a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum stored blocks (default: 10000).
    #[serde(default = "default_max_blocks")]
    pub max_blocks: u32,

    /// Maximum block age in days (default: 30).
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Run auto cleanup on this cadence (default: disabled).
    #[serde(default, with = "humantime_serde")]
    pub auto_cleanup_interval: Option<Duration>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            auto_cleanup_interval: None,
        }
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_blocks: Some(self.max_blocks),
            max_age_days: Some(self.max_age_days),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Block source endpoint and retry timing.
    #[serde(default = "default_source")]
    pub source: SourceConfig,

    /// Collection schedule.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Retention thresholds.
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            source: default_source(),
            collector: CollectorConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults. The result is not validated so
    /// that command-line overrides can be applied first; call
    /// [`validate`](Self::validate) afterwards.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references in URLs.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.source.url = expand_env_vars(&config.source.url);
        config.database.url = expand_env_vars(&config.database.url);
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database url must not be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }

        let url = self.source.url.trim();
        if url.is_empty() {
            return Err(ConfigError::ValidationError(
                "source url is required".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "source url must use http or https: '{}'",
                url
            )));
        }

        if self.source.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "source max_attempts must be positive".to_string(),
            ));
        }

        if self.collector.interval < MIN_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "collector interval must be at least {}s, got {:?}",
                MIN_INTERVAL.as_secs(),
                self.collector.interval
            )));
        }

        if self.retention.auto_cleanup_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ValidationError(
                "retention auto_cleanup_interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
