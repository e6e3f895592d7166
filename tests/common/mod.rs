//! Shared fixtures for integration tests
//!
//! Scripted prompt modules, service builders over in-memory and `SQLite`
//! storage, and polling helpers for background runs.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use gepa::domain::models::{ExecutionConfig, OptimizationConfig, OptimizationSession};
use gepa::infrastructure::database::{
    DatabaseConnection, SqlitePromptParameterRepository, SqliteSessionRepository,
};
use gepa::infrastructure::memory::{InMemoryPromptParameterRepository, InMemorySessionRepository};
use gepa::{CapabilityError, Evaluation, Genome, ModuleRegistry, OptimizationService, PromptModule};

pub const MODULE_ID: &str = "qa";

/// Scratch directory removed on drop.
pub fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

/// How a [`ScriptedModule`] answers rewrite requests.
#[derive(Debug, Clone, Copy)]
pub enum Rewrite {
    /// Append the suffix to the prompt
    Append(&'static str),
    /// Always fail
    Fail,
}

/// Module whose score is the total character count of the genome.
///
/// Counts evaluations and tracks the highest number of evaluations in flight.
pub struct ScriptedModule {
    costs: Vec<f64>,
    rewrite: Rewrite,
    delay: Option<Duration>,
    fail_evaluations: bool,
    evaluations: AtomicUsize,
    rewrites: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedModule {
    pub fn new() -> Self {
        Self {
            costs: vec![1.0],
            rewrite: Rewrite::Append(" Be specific."),
            delay: None,
            fail_evaluations: false,
            evaluations: AtomicUsize::new(0),
            rewrites: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.costs = vec![cost];
        self
    }

    /// Cost of the n-th evaluation; the last entry repeats.
    pub fn with_costs(mut self, costs: &[f64]) -> Self {
        self.costs = costs.to_vec();
        self
    }

    pub fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_evaluations(mut self) -> Self {
        self.fail_evaluations = true;
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn rewrites(&self) -> usize {
        self.rewrites.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromptModule for ScriptedModule {
    async fn evaluate(&self, genome: &Genome) -> Result<Evaluation, CapabilityError> {
        let call = self.evaluations.fetch_add(1, Ordering::SeqCst);
        let cost = self.costs[call.min(self.costs.len() - 1)];
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_evaluations {
            return Err(CapabilityError::Evaluation("scripted failure".to_string()));
        }
        let score: usize = genome.iter().map(|(_, text)| text.chars().count()).sum();
        Ok(Evaluation::new(score as f64, cost))
    }

    async fn rewrite(&self, prompt: &str, _directive: &str) -> Result<String, CapabilityError> {
        self.rewrites.fetch_add(1, Ordering::SeqCst);
        match self.rewrite {
            Rewrite::Append(suffix) => Ok(format!("{prompt}{suffix}")),
            Rewrite::Fail => Err(CapabilityError::Reflection("scripted failure".to_string())),
        }
    }
}

pub fn execution() -> ExecutionConfig {
    ExecutionConfig {
        max_concurrent_evaluations: 4,
        rng_seed: Some(7),
    }
}

pub fn registry_with(module: Arc<ScriptedModule>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_module(MODULE_ID, module as Arc<dyn PromptModule>);
    registry
}

/// Service over in-memory repositories with `module` registered as [`MODULE_ID`].
pub fn memory_service(module: Arc<ScriptedModule>) -> Arc<OptimizationService> {
    memory_service_with(registry_with(module), execution())
}

pub fn memory_service_with(registry: ModuleRegistry, execution: ExecutionConfig) -> Arc<OptimizationService> {
    Arc::new(OptimizationService::new(
        Arc::new(InMemorySessionRepository::new()),
        Arc::new(InMemoryPromptParameterRepository::new()),
        Arc::new(registry),
        execution,
    ))
}

/// Fresh migrated in-memory `SQLite` database.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = DatabaseConnection::in_memory()
        .await
        .expect("failed to create test database");
    db.migrate().await.expect("failed to run migrations");
    db
}

/// Service backed by `db` with `module` registered as [`MODULE_ID`].
pub fn sqlite_service(db: &DatabaseConnection, module: Arc<ScriptedModule>) -> Arc<OptimizationService> {
    Arc::new(OptimizationService::new(
        Arc::new(SqliteSessionRepository::new(db.pool().clone())),
        Arc::new(SqlitePromptParameterRepository::new(db.pool().clone())),
        Arc::new(registry_with(module)),
        execution(),
    ))
}

/// Register `prompts` as parameters of [`MODULE_ID`].
pub async fn register_parameters(service: &OptimizationService, prompts: &[&str]) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(prompts.len());
    for (i, prompt) in prompts.iter().enumerate() {
        let parameter = service
            .register_prompt_parameter(MODULE_ID, &format!("param_{i}"), prompt)
            .await
            .expect("failed to register parameter");
        ids.push(parameter.id);
    }
    ids
}

pub fn small_config() -> OptimizationConfig {
    OptimizationConfig {
        population_size: 4,
        generations: 3,
        mutation_rate: 0.5,
        crossover_rate: 0.7,
        tournament_size: 2,
        elitism_count: 1,
        budget: 1000.0,
        convergence_threshold: 0.0,
        max_iterations: 100,
        ..OptimizationConfig::default()
    }
}

/// Poll until the session reaches a terminal status.
pub async fn wait_for_terminal(service: &OptimizationService, id: Uuid) -> OptimizationSession {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let session = service
            .get_session(id)
            .await
            .expect("failed to load session")
            .expect("session disappeared");
        if session.is_terminal() {
            return session;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session {id} did not finish, status {}",
            session.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until at least `count` generations are stored.
pub async fn wait_for_generations(service: &OptimizationService, id: Uuid, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let session = service
            .get_session(id)
            .await
            .expect("failed to load session")
            .expect("session disappeared");
        if session.generations.len() >= count || session.is_terminal() {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for generations");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
