use serde::{Deserialize, Serialize};

use super::lifecycle::LifecycleConfig;

/// Main configuration structure for the issue lifecycle reconciler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Issue tracker connection
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Label rules, defaults and permissions
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Issue tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Repository owner (user or organisation)
    #[serde(default)]
    pub owner: String,

    /// Repository name
    #[serde(default)]
    pub repo: String,

    /// API token; usually supplied through the environment
    #[serde(default)]
    pub token: String,

    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Login of the bot account; resolved from the token when absent
    #[serde(default)]
    pub bot_login: Option<String>,

    /// Colour used when creating missing labels
    #[serde(default = "default_label_color")]
    pub label_color: String,

    /// In-call retry of transient HTTP failures
    #[serde(default)]
    pub http_retry: HttpRetryConfig,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_label_color() -> String {
    "ededed".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            token: String::new(),
            api_base: default_api_base(),
            bot_login: None,
            label_color: default_label_color(),
            http_retry: HttpRetryConfig::default(),
        }
    }
}

/// Exponential retry inside a single tracker call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpRetryConfig {
    #[serde(default = "default_http_initial_interval_ms")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_http_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Give up once this much time has been spent retrying
    #[serde(default = "default_http_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

const fn default_http_initial_interval_ms() -> u64 {
    500
}

const fn default_http_max_interval_ms() -> u64 {
    5_000
}

const fn default_http_max_elapsed_ms() -> u64 {
    20_000
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_http_initial_interval_ms(),
            max_interval_ms: default_http_max_interval_ms(),
            max_elapsed_ms: default_http_max_elapsed_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".issue-lifecycle/snapshots.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Also log to stdout when writing files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_stdout: default_true(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    1.0
}

const fn default_burst_size() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Retry policy configuration for failed passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Consecutive failed passes before the issue is surfaced to an operator
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    10_000
}

const fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Worker pool and pass configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Issues reconciled in parallel
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Timeout of each HTTP request, counted once its budget token is taken
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Delay between cycles of the `run` loop
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pause after posting each paper trail
    #[serde(default = "default_post_delay_ms")]
    pub post_delay_ms: u64,

    /// How long the tracker catalog is reused before refetching
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,

    /// Compute and log mutations without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

const fn default_max_workers() -> usize {
    4
}

const fn default_call_timeout_ms() -> u64 {
    30_000
}

const fn default_poll_interval_secs() -> u64 {
    300
}

const fn default_post_delay_ms() -> u64 {
    10_000
}

const fn default_catalog_ttl_secs() -> u64 {
    600
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            call_timeout_ms: default_call_timeout_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            post_delay_ms: default_post_delay_ms(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
            dry_run: false,
        }
    }
}
