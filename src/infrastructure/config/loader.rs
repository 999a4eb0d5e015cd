use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".issue-lifecycle";

/// Environment variable prefix; `__` separates nested keys.
pub const ENV_PREFIX: &str = "ISSUE_LIFECYCLE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_workers: {0}. Must be between 1 and 64")]
    InvalidMaxWorkers(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid call_timeout_ms: {0}. Must be at least 1")]
    InvalidCallTimeout(u64),

    #[error("Label {label} belongs to more than one exclusive group")]
    OverlappingExclusiveGroups { label: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .issue-lifecycle/config.yaml
    /// 3. .issue-lifecycle/local.yaml (optional overrides, usually holding the token)
    /// 4. Environment variables (ISSUE_LIFECYCLE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(Path::new(CONFIG_DIR))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Provider chain rooted at `dir`.
    pub fn figment(dir: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.worker.max_workers == 0 || config.worker.max_workers > 64 {
            return Err(ConfigError::InvalidMaxWorkers(config.worker.max_workers));
        }

        if config.worker.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidCallTimeout(config.worker.call_timeout_ms));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if !(config.rate_limit.requests_per_second > 0.0 && config.rate_limit.requests_per_second.is_finite()) {
            return Err(ConfigError::InvalidRateLimit(config.rate_limit.requests_per_second));
        }

        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.tracker.owner.is_empty() != config.tracker.repo.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tracker.owner and tracker.repo must be set together".to_string(),
            ));
        }

        let mut group_of: BTreeMap<String, usize> = BTreeMap::new();
        for (index, group) in config.lifecycle.exclusive_groups.iter().enumerate() {
            for label in group {
                let previous = group_of.insert(label.to_lowercase(), index);
                if previous.is_some_and(|p| p != index) {
                    return Err(ConfigError::OverlappingExclusiveGroups { label: label.clone() });
                }
            }
        }

        if config.lifecycle.needs_prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "lifecycle.needs_prefix cannot be empty".to_string(),
            ));
        }

        if config.lifecycle.ignore_keyword.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "lifecycle.ignore_keyword cannot be blank".to_string(),
            ));
        }

        Ok(())
    }
}
