//! Shared startup for commands that need the optimization service.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::domain::models::Config;
use crate::infrastructure::capabilities::default_registry;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::{
    DatabaseConnection, SqlitePromptParameterRepository, SqliteSessionRepository,
};
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::OptimizationService;

/// Everything a command needs, alive for the duration of the process.
pub struct AppContext {
    pub config: Config,
    pub service: Arc<OptimizationService>,
    database: DatabaseConnection,
    _logger: Option<LoggerImpl>,
}

impl AppContext {
    /// Load configuration, start logging, open and migrate the database.
    ///
    /// Interrupted sessions are not recovered here: another process may be
    /// running them. `session recover` does that explicitly.
    pub async fn bootstrap(config_path: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;
        let logger = init_logging(&config)?;

        let database = DatabaseConnection::open(&config.database.path, config.database.max_connections)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}. Run 'gepa init' first.",
                    config.database.path
                )
            })?;
        database.migrate().await.context("Failed to run database migrations")?;

        let registry = default_registry(&config).context("Failed to build module registry")?;
        let service = Arc::new(OptimizationService::new(
            Arc::new(SqliteSessionRepository::new(database.pool().clone())),
            Arc::new(SqlitePromptParameterRepository::new(database.pool().clone())),
            Arc::new(registry),
            config.execution.clone(),
        ));

        Ok(Self {
            config,
            service,
            database,
            _logger: logger,
        })
    }

    pub async fn shutdown(self) {
        self.database.close().await;
    }
}

/// Start logging; a second initialization in the same process is ignored.
pub fn init_logging(config: &Config) -> Result<Option<LoggerImpl>> {
    let log_config = LogConfig::try_from(&config.logging).context("Invalid logging configuration")?;
    Ok(LoggerImpl::init(&log_config).ok())
}
