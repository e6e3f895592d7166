//! Session lifecycle management.
//!
//! The manager is the only writer of [`OptimizationSession`] records. It
//! enforces the `Created -> Running -> {Completed, Failed, Cancelled}` state
//! machine, serializes writes per session and checks the run token on every
//! write coming from an execution.

use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{
    truncate_prompt, Generation, Genome, OptimizationConfig, OptimizationSession, PromptParameter,
    RunToken, ScoredGenome, SessionPage, SessionStatus, StopReason,
};
use crate::domain::ports::{PromptParameterRepository, SessionFilter, SessionRepository};

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Error message recorded on sessions found Running at startup.
pub const INTERRUPTED_MESSAGE: &str = "interrupted: the process stopped while the session was running";

pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    parameters: Arc<dyn PromptParameterRepository>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        parameters: Arc<dyn PromptParameterRepository>,
    ) -> Self {
        Self {
            sessions,
            parameters,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Forget the lock of a session that reached a terminal state.
    ///
    /// Terminal sessions reject every later write.
    async fn release_lock(&self, id: Uuid) {
        self.locks.lock().await.remove(&id);
    }

    async fn load(&self, id: Uuid) -> OptimizationResult<OptimizationSession> {
        self.sessions
            .get(id)
            .await?
            .ok_or(OptimizationError::SessionNotFound(id))
    }

    async fn load_current(&self, token: &RunToken) -> OptimizationResult<OptimizationSession> {
        let session = self.load(token.session_id).await?;
        if session.accepts(token) {
            Ok(session)
        } else {
            Err(OptimizationError::StaleRunToken(token.session_id))
        }
    }

    // ========================================================================
    // Prompt parameter registry
    // ========================================================================

    /// Register a prompt parameter owned by `module_id`.
    pub async fn register_parameter(
        &self,
        module_id: &str,
        name: &str,
        initial_prompt: &str,
    ) -> OptimizationResult<PromptParameter> {
        if module_id.trim().is_empty() {
            return Err(OptimizationError::InvalidConfig(
                "module_id cannot be empty".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(OptimizationError::InvalidConfig(
                "parameter name cannot be empty".to_string(),
            ));
        }

        let parameter = PromptParameter::new(
            module_id.to_string(),
            name.to_string(),
            initial_prompt.to_string(),
        );
        self.parameters.insert(&parameter).await?;
        info!(parameter_id = %parameter.id, module_id, name, "registered prompt parameter");
        Ok(parameter)
    }

    pub async fn get_parameter(&self, id: Uuid) -> OptimizationResult<Option<PromptParameter>> {
        self.parameters.get(id).await
    }

    pub async fn list_parameters(&self, module_id: &str) -> OptimizationResult<Vec<PromptParameter>> {
        self.parameters.list_by_module(module_id).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a session in `Created` with `population_size` identical seed genomes.
    ///
    /// # Errors
    /// - `InvalidConfig` for out-of-range settings, an empty or duplicated
    ///   parameter list, or a parameter owned by another module
    /// - `ParameterNotFound` for an unknown parameter id
    #[instrument(skip(self, config, parameter_ids), fields(parameters = parameter_ids.len()))]
    pub async fn create(
        &self,
        user_id: &str,
        module_id: &str,
        config: OptimizationConfig,
        parameter_ids: Vec<Uuid>,
    ) -> OptimizationResult<OptimizationSession> {
        config.validate()?;
        if user_id.trim().is_empty() {
            return Err(OptimizationError::InvalidConfig(
                "user_id cannot be empty".to_string(),
            ));
        }
        if module_id.trim().is_empty() {
            return Err(OptimizationError::InvalidConfig(
                "module_id cannot be empty".to_string(),
            ));
        }
        if parameter_ids.is_empty() {
            return Err(OptimizationError::InvalidConfig(
                "at least one prompt parameter is required".to_string(),
            ));
        }
        let unique: HashSet<&Uuid> = parameter_ids.iter().collect();
        if unique.len() != parameter_ids.len() {
            return Err(OptimizationError::InvalidConfig(
                "prompt parameter ids must be unique".to_string(),
            ));
        }

        let mut seed = Genome::new();
        for id in &parameter_ids {
            let parameter = self
                .parameters
                .get(*id)
                .await?
                .ok_or(OptimizationError::ParameterNotFound(*id))?;
            if parameter.module_id != module_id {
                return Err(OptimizationError::InvalidConfig(format!(
                    "parameter {id} belongs to module '{}', not '{module_id}'",
                    parameter.module_id
                )));
            }
            seed.set(
                *id,
                truncate_prompt(&parameter.initial_prompt, config.max_prompt_length),
            );
        }

        let seed_population = vec![seed; config.population_size];
        let session = OptimizationSession::new(
            user_id.to_string(),
            module_id.to_string(),
            config,
            parameter_ids,
            seed_population,
        );
        self.sessions.insert(&session).await?;

        info!(session_id = %session.id, "created optimization session");
        Ok(session)
    }

    /// Move a session to `Running` and hand out a fresh run token.
    ///
    /// # Errors
    /// - `AlreadyRunning` if the session is running
    /// - `TerminalSession` if the session already finished
    pub async fn begin_run(&self, id: Uuid) -> OptimizationResult<RunToken> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(id).await?;
        match session.status {
            SessionStatus::Running => return Err(OptimizationError::AlreadyRunning(id)),
            status if status.is_terminal() => {
                return Err(OptimizationError::TerminalSession { id, status })
            }
            _ => {}
        }

        let token = RunToken {
            session_id: id,
            run_id: Uuid::new_v4(),
        };
        session.status = SessionStatus::Running;
        session.active_run = Some(token.run_id);
        session.started_at = Some(Utc::now());
        session.touch();
        self.sessions.update(&session).await?;

        info!(session_id = %id, run_id = %token.run_id, "optimization run started");
        Ok(token)
    }

    /// Load the session if `token` still owns it.
    ///
    /// # Errors
    /// `StaleRunToken` after cancellation or a newer run.
    pub async fn ensure_current(&self, token: &RunToken) -> OptimizationResult<OptimizationSession> {
        self.load_current(token).await
    }

    /// Append the next generation and record the consumed budget.
    ///
    /// # Errors
    /// - `StaleRunToken` if the token no longer owns the session
    /// - `ExecutionFailure` if the generation is out of order or mis-sized
    pub async fn append_generation(
        &self,
        token: &RunToken,
        generation: &Generation,
        consumed_budget: f64,
    ) -> OptimizationResult<()> {
        let lock = self.session_lock(token.session_id).await;
        let _guard = lock.lock().await;

        let session = self.load_current(token).await?;
        if generation.index != session.generations.len() {
            return Err(OptimizationError::ExecutionFailure(format!(
                "expected generation {}, got {}",
                session.generations.len(),
                generation.index
            )));
        }
        if generation.size() != session.config.population_size {
            return Err(OptimizationError::ExecutionFailure(format!(
                "generation {} has {} individuals, expected {}",
                generation.index,
                generation.size(),
                session.config.population_size
            )));
        }

        self.sessions
            .append_generation(token.session_id, generation, consumed_budget)
            .await?;
        debug!(
            session_id = %token.session_id,
            generation = generation.index,
            best_fitness = generation.best_fitness,
            consumed_budget,
            "appended generation"
        );
        Ok(())
    }

    /// Write the best genome's text to every parameter and mark the session `Completed`.
    ///
    /// If any write fails, the prompts written so far are restored to their
    /// previous values so parameters only carry results of completed sessions.
    ///
    /// # Errors
    /// `StaleRunToken` if the token no longer owns the session.
    pub async fn complete(
        &self,
        token: &RunToken,
        best: ScoredGenome,
        reason: StopReason,
    ) -> OptimizationResult<OptimizationSession> {
        let lock = self.session_lock(token.session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load_current(token).await?;
        let mut finals = Vec::with_capacity(session.prompt_parameter_ids.len());
        for id in &session.prompt_parameter_ids {
            let text = best.genome.get(id).ok_or_else(|| {
                OptimizationError::ExecutionFailure(format!("best genome has no text for parameter {id}"))
            })?;
            let previous = self
                .parameters
                .get(*id)
                .await?
                .ok_or(OptimizationError::ParameterNotFound(*id))?
                .final_prompt;
            finals.push((*id, text.to_string(), previous));
        }

        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.best_genome = Some(best);
        session.stop_reason = Some(reason);
        session.active_run = None;
        session.completed_at = Some(now);
        session.updated_at = now;

        if let Err(err) = self.publish_final_prompts(&session, &finals).await {
            self.restore_final_prompts(&finals).await;
            return Err(err);
        }
        self.release_lock(session.id).await;

        info!(
            session_id = %session.id,
            stop_reason = %reason,
            generations = session.generations.len(),
            consumed_budget = session.consumed_budget,
            "optimization completed"
        );
        Ok(session)
    }

    async fn publish_final_prompts(
        &self,
        session: &OptimizationSession,
        finals: &[(Uuid, String, Option<String>)],
    ) -> OptimizationResult<()> {
        for (id, text, _) in finals {
            self.parameters.set_final_prompt(*id, text).await?;
        }
        self.sessions.update(session).await
    }

    async fn restore_final_prompts(&self, finals: &[(Uuid, String, Option<String>)]) {
        for (id, _, previous) in finals {
            let restored = match previous {
                Some(text) => self.parameters.set_final_prompt(*id, text).await,
                None => self.parameters.clear_final_prompt(*id).await,
            };
            if let Err(err) = restored {
                error!(parameter_id = %id, error = %err, "could not restore final prompt");
            }
        }
    }

    /// Mark the session `Failed` with `message`.
    ///
    /// Never returns an error: a stale token is ignored and persistence
    /// failures are logged.
    pub async fn fail(&self, token: &RunToken, message: &str) {
        let lock = self.session_lock(token.session_id).await;
        let _guard = lock.lock().await;

        let mut session = match self.load_current(token).await {
            Ok(session) => session,
            Err(err) => {
                debug!(session_id = %token.session_id, error = %err, "not recording failure");
                return;
            }
        };

        let now = Utc::now();
        session.status = SessionStatus::Failed;
        session.error = Some(message.to_string());
        session.active_run = None;
        session.completed_at = Some(now);
        session.updated_at = now;

        match self.sessions.update(&session).await {
            Ok(()) => {
                self.release_lock(session.id).await;
                error!(session_id = %session.id, error = message, "optimization failed");
            }
            Err(err) => error!(
                session_id = %session.id,
                error = %err,
                "could not record optimization failure"
            ),
        }
    }

    /// Cancel a `Created` or `Running` session, invalidating its run token.
    ///
    /// # Errors
    /// - `SessionNotFound` for an unknown id
    /// - `TerminalSession` if the session already finished
    pub async fn cancel(&self, id: Uuid) -> OptimizationResult<OptimizationSession> {
        let lock = self.session_lock(id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(id).await?;
        if session.is_terminal() {
            return Err(OptimizationError::TerminalSession {
                id,
                status: session.status,
            });
        }

        let now = Utc::now();
        session.status = SessionStatus::Cancelled;
        session.active_run = None;
        session.completed_at = Some(now);
        session.updated_at = now;
        self.sessions.update(&session).await?;
        self.release_lock(id).await;

        info!(session_id = %id, "optimization cancelled");
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>> {
        self.sessions.get(id).await
    }

    /// A user's sessions, newest first. `page` is 1-based.
    ///
    /// # Errors
    /// `InvalidPagination` for page 0 or a page size outside `1..=100`.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> OptimizationResult<SessionPage> {
        if page == 0 {
            return Err(OptimizationError::InvalidPagination(
                "page starts at 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(OptimizationError::InvalidPagination(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        self.sessions.list_by_user(user_id, page, page_size).await
    }

    pub async fn list(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>> {
        self.sessions.list(filter).await
    }

    /// Delete a session, cancelling it first if it has not finished.
    pub async fn delete(&self, id: Uuid) -> OptimizationResult<bool> {
        match self.cancel(id).await {
            Ok(_) | Err(OptimizationError::TerminalSession { .. }) => {}
            Err(OptimizationError::SessionNotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        }

        let lock = self.session_lock(id).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.sessions.delete(id).await?
        };
        self.release_lock(id).await;

        if deleted {
            info!(session_id = %id, "deleted optimization session");
        }
        Ok(deleted)
    }

    /// Delete terminal sessions not updated within `max_age_hours`.
    pub async fn cleanup(&self, max_age_hours: i64) -> OptimizationResult<usize> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours.max(0));
        let candidates = self.sessions.list(SessionFilter::default()).await?;

        let mut removed = 0;
        for session in candidates {
            if session.is_terminal() && session.updated_at < cutoff && self.delete(session.id).await? {
                removed += 1;
            }
        }

        info!(removed, max_age_hours, "cleaned up old optimization sessions");
        Ok(removed)
    }

    /// Mark sessions left `Running` by a previous process as `Failed`.
    pub async fn recover_interrupted(&self) -> OptimizationResult<usize> {
        let running = self
            .sessions
            .list(SessionFilter {
                status: Some(SessionStatus::Running),
                ..Default::default()
            })
            .await?;

        let mut recovered = 0;
        for session in running {
            if let Some(run_id) = session.active_run {
                let token = RunToken {
                    session_id: session.id,
                    run_id,
                };
                self.fail(&token, INTERRUPTED_MESSAGE).await;
                recovered += 1;
            }
        }

        if recovered > 0 {
            warn!(recovered, "marked interrupted optimization sessions as failed");
        }
        Ok(recovered)
    }
}
