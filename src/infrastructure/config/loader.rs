use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::Config;

/// Project directory holding config files and the database
pub const PROJECT_DIR: &str = ".gepa";

/// Prefix of environment variable overrides (`GEPA_SECTION__KEY`)
pub const ENV_PREFIX: &str = "GEPA_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
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

    #[error("Invalid max_concurrent_evaluations: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid optimization defaults: {0}")]
    InvalidOptimizationDefaults(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .gepa/config.yaml (project config, created by init)
    /// 3. .gepa/local.yaml (project local overrides, optional)
    /// 4. `explicit` file passed with `--config`, if any
    /// 5. Environment variables (GEPA_* prefix, highest priority)
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let config: Config = Self::figment(explicit)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The merged provider chain, without extraction or validation.
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(format!("{PROJECT_DIR}/config.yaml")))
            .merge(Yaml::file(format!("{PROJECT_DIR}/local.yaml")));

        if let Some(path) = explicit {
            figment = figment.merge(Yaml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
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
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        let concurrency = config.execution.max_concurrent_evaluations;
        if concurrency == 0 || concurrency > 64 {
            return Err(ConfigError::InvalidConcurrency(concurrency));
        }

        if config.reflection.rate_limit_rps <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(
                config.reflection.rate_limit_rps,
            ));
        }

        if config.reflection.initial_backoff_ms >= config.reflection.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.reflection.initial_backoff_ms,
                config.reflection.max_backoff_ms,
            ));
        }

        config
            .optimization_defaults
            .validate()
            .map_err(|e| ConfigError::InvalidOptimizationDefaults(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".gepa/gepa.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.execution.max_concurrent_evaluations, 4);
        assert_eq!(config.optimization_defaults.reflection_model, "template");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: pretty
execution:
  max_concurrent_evaluations: 8
  rng_seed: 42
optimization_defaults:
  population_size: 6
  budget: 50.0
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.execution.rng_seed, Some(42));
        assert_eq!(config.optimization_defaults.population_size, 6);
        assert_eq!(config.optimization_defaults.generations, 5);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.execution.max_concurrent_evaluations = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.reflection.initial_backoff_ms = 5000;
        config.reflection.max_backoff_ms = 1000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(5000, 1000))
        ));
    }

    #[test]
    fn test_validate_optimization_defaults() {
        let mut config = Config::default();
        config.optimization_defaults.elitism_count = 50;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidOptimizationDefaults(_))
        ));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("GEPA_LOGGING__LEVEL", Some("debug")),
                ("GEPA_EXECUTION__MAX_CONCURRENT_EVALUATIONS", Some("2")),
                ("GEPA_OPTIMIZATION_DEFAULTS__BUDGET", Some("40.5")),
            ],
            || {
                let config: Config = ConfigLoader::figment(None).extract().unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.execution.max_concurrent_evaluations, 2);
                assert!((config.optimization_defaults.budget - 40.5).abs() < f64::EPSILON);
            },
        );
    }

    #[test]
    fn test_explicit_file_then_env_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "logging:\n  level: warn\n  format: pretty\ndatabase:\n  path: explicit.db"
        )
        .unwrap();
        file.flush().unwrap();

        temp_env::with_var("GEPA_LOGGING__LEVEL", Some("error"), || {
            let config = ConfigLoader::load(Some(file.path())).unwrap();
            assert_eq!(config.logging.level, "error", "env should win");
            assert_eq!(config.logging.format, "pretty", "file should win over defaults");
            assert_eq!(config.database.path, "explicit.db");
        });
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "optimization_defaults:\n  population_size: 4\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(
            override_file,
            "optimization_defaults:\n  population_size: 8\nlogging:\n  level: debug"
        )
        .unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.optimization_defaults.population_size, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = ConfigLoader::load_from_file("/nonexistent/gepa.yaml").unwrap();
        assert_eq!(config.database.path, ".gepa/gepa.db");
    }
}
