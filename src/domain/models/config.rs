use serde::{Deserialize, Serialize};

use super::optimization::OptimizationConfig;

/// Main configuration structure for GEPA
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Optimization settings used when a session does not override them
    #[serde(default)]
    pub optimization_defaults: OptimizationConfig,

    /// Reflection (mutation) capability configuration
    #[serde(default)]
    pub reflection: ReflectionConfig,
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
    ".gepa/gepa.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
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

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Background execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Maximum evaluation/reflection calls in flight per generation
    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,

    /// Seed for the genetic operators' random source (entropy when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

const fn default_max_concurrent_evaluations() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_evaluations: default_max_concurrent_evaluations(),
            rng_seed: None,
        }
    }
}

/// Anthropic reflection capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReflectionConfig {
    /// API key (falls back to ANTHROPIC_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for the API (for testing/proxies)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for rewrites; sessions select it through `reflection_model`
    #[serde(default = "default_reflection_model")]
    pub model: String,

    /// Maximum tokens generated per rewrite
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Requests per second allowed
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_reflection_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

const fn default_max_tokens() -> u32 {
    2048
}

const fn default_rate_limit_rps() -> f64 {
    5.0
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_reflection_model(),
            max_tokens: default_max_tokens(),
            rate_limit_rps: default_rate_limit_rps(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ReflectionConfig {
    /// Configured key, or the `ANTHROPIC_API_KEY` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }
}
