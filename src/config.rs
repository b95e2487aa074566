//! Configuration module for blockwatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, pool size)
//! - Source endpoint and retry timing
//! - Collection interval and retention thresholds

mod app;
mod validation;

pub use app::{
    AppConfig, CollectorConfig, DEFAULT_DATABASE_URL, DatabaseConfig, RetentionConfig,
    ServerConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
