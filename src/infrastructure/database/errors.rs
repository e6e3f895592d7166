use thiserror::Error;

use crate::domain::errors::OptimizationError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(String),

    #[error("UUID parse error: {0}")]
    UuidParseError(#[from] uuid::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("DateTime parse error: {0}")]
    DateTimeParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<DatabaseError> for OptimizationError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::JsonError(e) => Self::Serialization(e.to_string()),
            DatabaseError::ParseError(msg) => Self::Serialization(msg),
            other => Self::Persistence(other.to_string()),
        }
    }
}
