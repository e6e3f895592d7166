/// Optimization session repository port (trait) for dependency injection.
///
/// Defines the contract for session storage operations that infrastructure
/// adapters must implement. Services depend on this trait, not concrete implementations.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OptimizationResult;
use crate::domain::models::{Generation, OptimizationSession, SessionPage, SessionStatus};

/// Filter for listing sessions across users
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub module_id: Option<String>,
}

/// Repository trait for optimization session persistence
///
/// Implementations should handle:
/// - JSON serialization of config, parameter ids, seed population and best genome
/// - Storing generations append-only, ordered by index
/// - Atomic generation append together with the consumed budget
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Inserts a new session (without generations)
    ///
    /// # Errors
    /// Returns error if the id already exists or the store fails
    async fn insert(&self, session: &OptimizationSession) -> OptimizationResult<()>;

    /// Retrieves a session with all of its generations
    ///
    /// # Returns
    /// - `Some(session)` if found
    /// - `None` if not found
    async fn get(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>>;

    /// Persists status and bookkeeping fields; generations are left untouched
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the session does not exist
    async fn update(&self, session: &OptimizationSession) -> OptimizationResult<()>;

    /// Appends one generation and records the session's consumed budget
    async fn append_generation(
        &self,
        session_id: Uuid,
        generation: &Generation,
        consumed_budget: f64,
    ) -> OptimizationResult<()>;

    /// Lists a user's sessions, newest first
    ///
    /// `page` is 1-based.
    async fn list_by_user(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> OptimizationResult<SessionPage>;

    /// Lists all sessions matching the filter, newest first
    async fn list(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>>;

    /// Deletes a session and its generations
    ///
    /// # Returns
    /// `true` if a session was removed
    async fn delete(&self, id: Uuid) -> OptimizationResult<bool>;
}
