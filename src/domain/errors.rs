//! Domain errors for the prompt optimizer.

use thiserror::Error;
use uuid::Uuid;

use super::models::SessionStatus;

/// Errors raised by the optimization core.
///
/// `AlreadyRunning`, `TerminalSession` and `StaleRunToken` are internal guards:
/// the orchestrator turns them into no-ops. `EvaluationError` is absorbed per
/// genome and `BudgetExhausted` is a graceful stop, so only `InvalidConfig`
/// and lookup failures ever reach an external caller.
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("Invalid optimization config: {0}")]
    InvalidConfig(String),

    #[error("Optimization session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Prompt parameter not found: {0}")]
    ParameterNotFound(Uuid),

    #[error("Session {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Session {id} is terminal ({status})")]
    TerminalSession { id: Uuid, status: SessionStatus },

    #[error("Run token for session {0} is no longer valid")]
    StaleRunToken(Uuid),

    #[error("Evaluation failed: {0}")]
    EvaluationError(String),

    #[error("Budget exhausted: consumed {consumed} of {budget}")]
    BudgetExhausted { consumed: f64, budget: f64 },

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("No prompt module registered for module id '{0}'")]
    ModuleNotFound(String),

    #[error("No reflector registered for reflection model '{0}'")]
    ReflectorNotFound(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OptimizationError {
    /// Guards that mean "another run owns this session"; callers treat them as no-ops.
    pub const fn is_run_guard(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning(_) | Self::TerminalSession { .. } | Self::StaleRunToken(_)
        )
    }
}

pub type OptimizationResult<T> = Result<T, OptimizationError>;

impl From<sqlx::Error> for OptimizationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OptimizationError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for OptimizationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure reported by an external capability (evaluation or reflection).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("reflection failed: {0}")]
    Reflection(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<CapabilityError> for OptimizationError {
    fn from(err: CapabilityError) -> Self {
        Self::EvaluationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_guards() {
        let id = Uuid::new_v4();
        assert!(OptimizationError::AlreadyRunning(id).is_run_guard());
        assert!(OptimizationError::StaleRunToken(id).is_run_guard());
        assert!(OptimizationError::TerminalSession {
            id,
            status: SessionStatus::Completed
        }
        .is_run_guard());
        assert!(!OptimizationError::InvalidConfig("x".into()).is_run_guard());
        assert!(!OptimizationError::ExecutionFailure("boom".into()).is_run_guard());
    }

    #[test]
    fn test_capability_error_maps_to_evaluation_error() {
        let err: OptimizationError = CapabilityError::Evaluation("timeout".into()).into();
        assert!(matches!(err, OptimizationError::EvaluationError(msg) if msg.contains("timeout")));
    }
}
