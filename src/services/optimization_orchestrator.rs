//! Background execution of the generational loop.
//!
//! `execute` claims the session through the lifecycle manager and spawns the
//! loop as a tokio task. The task never propagates errors: guard errors end
//! it quietly, everything else is recorded on the session as `Failed`.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{ExecutionConfig, Generation, RunToken, ScoredGenome, StopReason};
use crate::services::convergence_tracker::ConvergenceTracker;
use crate::services::fitness_evaluator::{BudgetLedger, FitnessEvaluator};
use crate::services::genetic_operators::{GeneticOperators, Population};
use crate::services::module_registry::ModuleRegistry;
use crate::services::session_manager::SessionManager;

pub struct OptimizationOrchestrator {
    manager: Arc<SessionManager>,
    modules: Arc<ModuleRegistry>,
    execution: ExecutionConfig,
}

impl OptimizationOrchestrator {
    pub fn new(
        manager: Arc<SessionManager>,
        modules: Arc<ModuleRegistry>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            manager,
            modules,
            execution,
        }
    }

    /// Start the loop for `session_id` in the background.
    ///
    /// Returns `None` without side effects when the session is already
    /// running, terminal or unknown.
    pub async fn execute(self: &Arc<Self>, session_id: Uuid) -> Option<JoinHandle<()>> {
        let token = match self.manager.begin_run(session_id).await {
            Ok(token) => token,
            Err(err) if err.is_run_guard() => {
                debug!(%session_id, reason = %err, "execute ignored");
                return None;
            }
            Err(err) => {
                warn!(%session_id, error = %err, "could not start optimization run");
                return None;
            }
        };

        let orchestrator = Arc::clone(self);
        Some(tokio::spawn(async move {
            orchestrator.supervise(token).await;
        }))
    }

    /// Run the loop and route its outcome; panics are recorded as failures too.
    async fn supervise(self: Arc<Self>, token: RunToken) {
        let runner = Arc::clone(&self);
        let outcome = tokio::spawn(async move { runner.run(token).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_run_guard() => {
                info!(session_id = %token.session_id, reason = %err, "run stopped, session no longer owned");
            }
            Ok(Err(err)) => self.manager.fail(&token, &err.to_string()).await,
            Err(join_err) => {
                let message = format!("optimization task aborted: {join_err}");
                self.manager.fail(&token, &message).await;
            }
        }
    }

    #[instrument(skip(self), fields(session_id = %token.session_id))]
    async fn run(&self, token: RunToken) -> OptimizationResult<()> {
        let session = self.manager.ensure_current(&token).await?;
        let config = session.config.clone();
        let module = self
            .modules
            .resolve(&session.module_id, &config.reflection_model)?;
        let concurrency = self.execution.max_concurrent_evaluations.max(1);

        let ledger = Arc::new(BudgetLedger::new(config.budget, session.consumed_budget));
        let evaluator = FitnessEvaluator::new(Arc::clone(&module), Arc::clone(&ledger), concurrency);
        let mut operators = GeneticOperators::new(config.clone(), self.execution.rng_seed);
        let mut tracker = ConvergenceTracker::new(&config);

        let mut population = Population::seeded(session.seed_population);
        let mut index = session.generations.len();
        let mut best: Option<ScoredGenome> = None;

        loop {
            self.manager.ensure_current(&token).await?;

            let batch = evaluator.evaluate_population(population.offspring).await;
            let individuals: Vec<ScoredGenome> =
                population.elites.into_iter().chain(batch.scored).collect();
            let generation = Generation::new(index, individuals, batch.evaluations);

            if let Some(candidate) = generation.best_individual() {
                if best.as_ref().map_or(true, |b| candidate.fitness > b.fitness) {
                    best = Some(candidate.clone());
                }
            }

            self.manager
                .append_generation(&token, &generation, ledger.consumed())
                .await?;
            info!(
                generation = index,
                best_fitness = generation.best_fitness,
                mean_fitness = generation.mean_fitness,
                evaluations = generation.evaluations,
                consumed_budget = ledger.consumed(),
                "generation complete"
            );

            let converged = tracker.observe(index, generation.best_fitness);
            let stop = if batch.budget_exhausted {
                Some(StopReason::BudgetExhausted)
            } else {
                converged
            };

            if let Some(reason) = stop {
                let best = best.ok_or_else(|| {
                    OptimizationError::ExecutionFailure("no genome was produced".to_string())
                })?;
                self.manager.complete(&token, best, reason).await?;
                return Ok(());
            }

            population = operators
                .next_population(&generation, module.as_ref(), concurrency)
                .await;
            index += 1;
        }
    }
}
