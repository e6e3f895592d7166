//! Optimization service: the operations exposed to the CLI.
//!
//! Wraps the lifecycle manager and the orchestrator and adds read-side views
//! (progress, population, statistics) computed from the stored sessions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{
    EvaluationOutcome, ExecutionConfig, Genome, OptimizationConfig, OptimizationSession,
    PromptParameter, ScoredGenome, SessionPage, SessionStatus, WORST_FITNESS,
};
use crate::domain::ports::{PromptParameterRepository, SessionFilter, SessionRepository};
use crate::services::module_registry::ModuleRegistry;
use crate::services::optimization_orchestrator::OptimizationOrchestrator;
use crate::services::session_manager::SessionManager;

/// Individuals listed by [`OptimizationService::population`].
pub const POPULATION_VIEW_LIMIT: usize = 10;

/// Snapshot of a session's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProgress {
    pub session_id: Uuid,
    pub status: SessionStatus,
    /// Index of the latest stored generation, `None` before generation 0
    pub current_generation: Option<usize>,
    pub total_generations: usize,
    /// Fraction in `[0, 1]`
    pub progress: f64,
    pub best_fitness: Option<f64>,
    pub best_genome: Option<Genome>,
    pub population_size: usize,
    pub consumed_budget: f64,
    pub budget: f64,
    pub estimated_remaining_seconds: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedIndividual {
    pub rank: usize,
    pub fitness: f64,
    pub outcome: EvaluationOutcome,
    pub genome: Genome,
}

/// Latest generation ranked by fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationView {
    pub session_id: Uuid,
    pub generation: Option<usize>,
    pub population_size: usize,
    pub individuals: Vec<RankedIndividual>,
    pub best_fitness: Option<f64>,
    pub worst_fitness: Option<f64>,
    pub average_fitness: Option<f64>,
}

/// Aggregate statistics over all sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub total_sessions: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_module: BTreeMap<String, usize>,
    pub completed_sessions: usize,
    pub running_sessions: usize,
    pub average_best_fitness: Option<f64>,
    pub success_rate: f64,
}

pub struct OptimizationService {
    manager: Arc<SessionManager>,
    orchestrator: Arc<OptimizationOrchestrator>,
    modules: Arc<ModuleRegistry>,
}

impl OptimizationService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        parameters: Arc<dyn PromptParameterRepository>,
        modules: Arc<ModuleRegistry>,
        execution: ExecutionConfig,
    ) -> Self {
        let manager = Arc::new(SessionManager::new(sessions, parameters));
        let orchestrator = Arc::new(OptimizationOrchestrator::new(
            Arc::clone(&manager),
            Arc::clone(&modules),
            execution,
        ));
        Self {
            manager,
            orchestrator,
            modules,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub async fn register_prompt_parameter(
        &self,
        module_id: &str,
        name: &str,
        initial_prompt: &str,
    ) -> OptimizationResult<PromptParameter> {
        self.manager
            .register_parameter(module_id, name, initial_prompt)
            .await
    }

    pub async fn get_prompt_parameter(&self, id: Uuid) -> OptimizationResult<Option<PromptParameter>> {
        self.manager.get_parameter(id).await
    }

    pub async fn list_prompt_parameters(&self, module_id: &str) -> OptimizationResult<Vec<PromptParameter>> {
        self.manager.list_parameters(module_id).await
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        module_id: &str,
        config: OptimizationConfig,
        parameter_ids: Vec<Uuid>,
    ) -> OptimizationResult<OptimizationSession> {
        self.manager
            .create(user_id, module_id, config, parameter_ids)
            .await
    }

    /// Fire-and-forget trigger; a duplicate call is a no-op returning `None`.
    pub async fn execute(&self, session_id: Uuid) -> Option<JoinHandle<()>> {
        self.orchestrator.execute(session_id).await
    }

    pub async fn get_session(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>> {
        self.manager.get(id).await
    }

    async fn require(&self, id: Uuid) -> OptimizationResult<OptimizationSession> {
        self.manager
            .get(id)
            .await?
            .ok_or(OptimizationError::SessionNotFound(id))
    }

    pub async fn user_sessions(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> OptimizationResult<SessionPage> {
        self.manager.list_by_user(user_id, page, page_size).await
    }

    pub async fn list_sessions(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>> {
        self.manager.list(filter).await
    }

    pub async fn cancel(&self, id: Uuid) -> OptimizationResult<OptimizationSession> {
        self.manager.cancel(id).await
    }

    pub async fn delete(&self, id: Uuid) -> OptimizationResult<bool> {
        self.manager.delete(id).await
    }

    pub async fn cleanup(&self, max_age_hours: i64) -> OptimizationResult<usize> {
        self.manager.cleanup(max_age_hours).await
    }

    pub async fn recover_interrupted(&self) -> OptimizationResult<usize> {
        self.manager.recover_interrupted().await
    }

    pub async fn progress(&self, id: Uuid) -> OptimizationResult<OptimizationProgress> {
        let session = self.require(id).await?;
        Ok(progress_of(&session))
    }

    pub async fn population(&self, id: Uuid) -> OptimizationResult<PopulationView> {
        let session = self.require(id).await?;
        Ok(population_of(&session))
    }

    pub async fn stats(&self) -> OptimizationResult<OptimizationStats> {
        let sessions = self.manager.list(SessionFilter::default()).await?;
        Ok(stats_of(&sessions))
    }
}

/// Best individual across every stored generation.
fn best_so_far(session: &OptimizationSession) -> Option<&ScoredGenome> {
    session
        .best_genome
        .as_ref()
        .or_else(|| {
            session
                .generations
                .iter()
                .filter_map(|g| g.best_individual())
                .fold(None, |best: Option<&ScoredGenome>, candidate| match best {
                    Some(current) if current.fitness >= candidate.fitness => Some(current),
                    _ => Some(candidate),
                })
        })
}

pub fn progress_of(session: &OptimizationSession) -> OptimizationProgress {
    let total_generations = session.config.effective_generations();
    let stored = session.generations.len();
    let progress = if session.status == SessionStatus::Completed {
        1.0
    } else {
        (stored as f64 / (total_generations + 1) as f64).clamp(0.0, 1.0)
    };

    let estimated_remaining_seconds = match (session.status, session.started_at) {
        (SessionStatus::Running, Some(started)) if progress > 0.0 => {
            let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
            Some(elapsed / progress * (1.0 - progress))
        }
        _ => None,
    };

    let best = best_so_far(session);
    OptimizationProgress {
        session_id: session.id,
        status: session.status,
        current_generation: stored.checked_sub(1),
        total_generations,
        progress,
        best_fitness: best.map(|b| b.fitness),
        best_genome: best.map(|b| b.genome.clone()),
        population_size: session.config.population_size,
        consumed_budget: session.consumed_budget,
        budget: session.config.budget,
        estimated_remaining_seconds,
        error: session.error.clone(),
    }
}

pub fn population_of(session: &OptimizationSession) -> PopulationView {
    let Some(latest) = session.latest_generation() else {
        return PopulationView {
            session_id: session.id,
            generation: None,
            population_size: session.config.population_size,
            individuals: Vec::new(),
            best_fitness: None,
            worst_fitness: None,
            average_fitness: None,
        };
    };

    let individuals = latest
        .ranked()
        .into_iter()
        .take(POPULATION_VIEW_LIMIT)
        .enumerate()
        .map(|(i, individual)| RankedIndividual {
            rank: i + 1,
            fitness: individual.fitness,
            outcome: individual.outcome,
            genome: individual.genome.clone(),
        })
        .collect();

    let scored: Vec<f64> = latest
        .individuals
        .iter()
        .filter(|s| s.is_scored())
        .map(|s| s.fitness)
        .collect();
    let worst = scored.iter().copied().reduce(f64::min);

    PopulationView {
        session_id: session.id,
        generation: Some(latest.index),
        population_size: latest.size(),
        individuals,
        best_fitness: Some(latest.best_fitness),
        worst_fitness: worst,
        average_fitness: (latest.mean_fitness > WORST_FITNESS).then_some(latest.mean_fitness),
    }
}

pub fn stats_of(sessions: &[OptimizationSession]) -> OptimizationStats {
    let mut stats = OptimizationStats {
        total_sessions: sessions.len(),
        ..Default::default()
    };

    let mut best_sum = 0.0;
    let mut best_count = 0usize;
    for session in sessions {
        *stats.by_status.entry(session.status.to_string()).or_default() += 1;
        *stats.by_module.entry(session.module_id.clone()).or_default() += 1;

        match session.status {
            SessionStatus::Completed => {
                stats.completed_sessions += 1;
                if let Some(best) = &session.best_genome {
                    best_sum += best.fitness;
                    best_count += 1;
                }
            }
            SessionStatus::Running => stats.running_sessions += 1,
            _ => {}
        }
    }

    stats.average_best_fitness = (best_count > 0).then(|| best_sum / best_count as f64);
    stats.success_rate = stats.completed_sessions as f64 / stats.total_sessions.max(1) as f64;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Generation, StopReason};

    fn session_with(fitness: &[&[f64]]) -> OptimizationSession {
        let mut session = OptimizationSession::new(
            "alice".into(),
            "qa".into(),
            OptimizationConfig {
                population_size: 3,
                generations: 3,
                ..Default::default()
            },
            vec![],
            vec![],
        );
        session.generations = fitness
            .iter()
            .enumerate()
            .map(|(i, gen)| {
                Generation::new(
                    i,
                    gen.iter()
                        .map(|f| ScoredGenome::scored(Genome::new(), *f, 1.0))
                        .collect(),
                    gen.len(),
                )
            })
            .collect();
        session
    }

    #[test]
    fn test_progress_before_any_generation() {
        let session = session_with(&[]);
        let progress = progress_of(&session);

        assert_eq!(progress.current_generation, None);
        assert!(progress.progress.abs() < f64::EPSILON);
        assert_eq!(progress.best_fitness, None);
        assert_eq!(progress.total_generations, 3);
    }

    #[test]
    fn test_progress_tracks_best_across_generations() {
        let mut session = session_with(&[&[0.1, 0.7, 0.2], &[0.3, 0.5, 0.6]]);
        session.status = SessionStatus::Running;
        session.started_at = Some(Utc::now());

        let progress = progress_of(&session);
        assert_eq!(progress.current_generation, Some(1));
        assert!((progress.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(progress.best_fitness, Some(0.7));
        assert!(progress.estimated_remaining_seconds.is_some());
    }

    #[test]
    fn test_completed_progress_is_one() {
        let mut session = session_with(&[&[0.1, 0.2, 0.3]]);
        session.status = SessionStatus::Completed;
        session.stop_reason = Some(StopReason::Converged);

        assert!((progress_of(&session).progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_population_view_ranks_latest_generation() {
        let session = session_with(&[&[0.1, 0.2, 0.3], &[0.4, 0.9, 0.6]]);
        let view = population_of(&session);

        assert_eq!(view.generation, Some(1));
        let ranked: Vec<(usize, f64)> = view.individuals.iter().map(|i| (i.rank, i.fitness)).collect();
        assert_eq!(ranked, vec![(1, 0.9), (2, 0.6), (3, 0.4)]);
        assert_eq!(view.worst_fitness, Some(0.4));
        assert!((view.average_fitness.unwrap() - 19.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_distribution_and_success_rate() {
        let mut completed = session_with(&[&[0.5, 0.1, 0.2]]);
        completed.status = SessionStatus::Completed;
        completed.best_genome = Some(ScoredGenome::scored(Genome::new(), 0.5, 1.0));
        let mut running = session_with(&[]);
        running.status = SessionStatus::Running;
        let created = session_with(&[]);

        let stats = stats_of(&[completed, running, created]);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.completed_sessions, 1);
        assert_eq!(stats.running_sessions, 1);
        assert_eq!(stats.by_status.get("created"), Some(&1));
        assert_eq!(stats.by_module.get("qa"), Some(&3));
        assert_eq!(stats.average_best_fitness, Some(0.5));
        assert!((stats.success_rate - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_of_nothing() {
        let stats = stats_of(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert!(stats.success_rate.abs() < f64::EPSILON);
    }
}
