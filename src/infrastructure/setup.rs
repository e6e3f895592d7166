//! Project initialization
//!
//! Creates the `.gepa` directory, writes a default configuration file and
//! migrates the session database.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::config::PROJECT_DIR;
use super::database::DatabaseConnection;

/// Default configuration template content
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# GEPA prompt optimizer configuration
# Override settings by editing this file, adding .gepa/local.yaml, or setting
# environment variables with the GEPA_ prefix
#
# Example environment variables:
#   export GEPA_DATABASE__PATH=/custom/path/gepa.db
#   export GEPA_LOGGING__LEVEL=debug
#   export GEPA_EXECUTION__MAX_CONCURRENT_EVALUATIONS=8

database:
  # Path to SQLite database file (project-local)
  path: ".gepa/gepa.db"
  max_connections: 10

logging:
  # trace, debug, info, warn, error
  level: "info"
  # json, pretty
  format: "pretty"
  # daily, hourly, never (only used when log_dir is set)
  rotation: "daily"

execution:
  # Evaluation and reflection calls in flight per generation
  max_concurrent_evaluations: 4

# Used for sessions created without explicit overrides
optimization_defaults:
  population_size: 10
  generations: 5
  mutation_rate: 0.3
  crossover_rate: 0.7
  tournament_size: 3
  elitism_count: 2
  reflection_model: "template"
  max_prompt_length: 4000
  budget: 15.0
  convergence_threshold: 0.01
  max_iterations: 100
  convergence_patience: 1

# Claude reflection; the key may also come from ANTHROPIC_API_KEY
reflection:
  model: "claude-3-5-haiku-latest"
  max_tokens: 2048
  rate_limit_rps: 5.0
  max_retries: 3
  initial_backoff_ms: 1000
  max_backoff_ms: 60000
  timeout_secs: 120
"#;

/// Setup paths and directories
#[derive(Debug, Clone)]
pub struct SetupPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl SetupPaths {
    /// Setup paths for the current directory
    pub fn new() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self::in_dir(&current_dir))
    }

    pub fn in_dir(root: &Path) -> Self {
        let config_dir = root.join(PROJECT_DIR);
        Self {
            config_file: config_dir.join("config.yaml"),
            config_dir,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

/// What `initialize` created
#[derive(Debug, Clone, serde::Serialize)]
pub struct InitReport {
    pub config_file: PathBuf,
    pub config_written: bool,
    pub database_path: PathBuf,
}

/// Write the default configuration file, overwriting only with `force`
///
/// Returns whether the file was written.
pub fn create_config_file(paths: &SetupPaths, force: bool) -> Result<bool> {
    if paths.config_file.exists() && !force {
        return Ok(false);
    }

    fs::create_dir_all(&paths.config_dir).context("Failed to create config directory")?;
    fs::write(&paths.config_file, DEFAULT_CONFIG_TEMPLATE).context("Failed to write config file")?;
    Ok(true)
}

/// Create the database file and apply migrations
pub async fn run_migrations(database_path: &Path) -> Result<()> {
    let connection = DatabaseConnection::open(&database_path.to_string_lossy(), 1)
        .await
        .context("Failed to connect to database")?;
    connection.migrate().await.context("Failed to run migrations")?;
    connection.close().await;
    Ok(())
}

/// Full project initialization
pub async fn initialize(paths: &SetupPaths, database_path: &Path, force: bool) -> Result<InitReport> {
    let config_written = create_config_file(paths, force)?;
    run_migrations(database_path).await?;

    Ok(InitReport {
        config_file: paths.config_file.clone(),
        config_written,
        database_path: database_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Config;

    #[test]
    fn test_default_template_parses() {
        let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.optimization_defaults.population_size, 10);
        assert_eq!(config.optimization_defaults.reflection_model, "template");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.optimization_defaults.validate().is_ok());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SetupPaths::in_dir(dir.path());
        let db = paths.config_dir.join("gepa.db");

        let first = initialize(&paths, &db, false).await.unwrap();
        assert!(first.config_written);
        assert!(paths.is_initialized());
        assert!(db.exists());

        fs::write(&paths.config_file, "logging:\n  level: debug\n").unwrap();
        let second = initialize(&paths, &db, false).await.unwrap();
        assert!(!second.config_written);
        assert!(fs::read_to_string(&paths.config_file).unwrap().contains("debug"));

        let forced = initialize(&paths, &db, true).await.unwrap();
        assert!(forced.config_written);
    }
}
