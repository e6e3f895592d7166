//! Domain models for evolutionary prompt optimization sessions.
//!
//! A [`Genome`] assigns candidate prompt text to every prompt parameter of a
//! module. Each generation scores a full population of genomes; an
//! [`OptimizationSession`] records the configuration, the append-only list of
//! [`Generation`]s and the lifecycle status of one search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::errors::{OptimizationError, OptimizationResult};

/// Fitness assigned to genomes that failed evaluation or were never evaluated.
pub const WORST_FITNESS: f64 = f64::MIN;

/// Tunables for one optimization session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizationConfig {
    /// Number of genomes per generation (>= 2)
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Requested number of generations after the initial one (>= 1)
    #[serde(default = "default_generations")]
    pub generations: usize,

    /// Per-child, per-parameter probability of a reflection rewrite
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Probability that a parent pair is recombined instead of copied
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,

    /// Individuals sampled per tournament
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,

    /// Genomes carried unchanged into the next generation
    #[serde(default = "default_elitism_count")]
    pub elitism_count: usize,

    /// Identifier of the reflection capability used for mutation
    #[serde(default = "default_reflection_model")]
    pub reflection_model: String,

    /// Maximum prompt length in characters
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,

    /// Upper bound on evaluation cost units consumed by the run
    #[serde(default = "default_budget")]
    pub budget: f64,

    /// Minimum fractional improvement of the best fitness that counts as progress
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Absolute generation cap, independent of `generations`
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Consecutive below-threshold generations before the run is considered converged
    #[serde(default = "default_convergence_patience")]
    pub convergence_patience: usize,
}

const fn default_population_size() -> usize {
    10
}

const fn default_generations() -> usize {
    5
}

const fn default_mutation_rate() -> f64 {
    0.3
}

const fn default_crossover_rate() -> f64 {
    0.7
}

const fn default_tournament_size() -> usize {
    3
}

const fn default_elitism_count() -> usize {
    2
}

fn default_reflection_model() -> String {
    "template".to_string()
}

const fn default_max_prompt_length() -> usize {
    4000
}

const fn default_budget() -> f64 {
    15.0
}

const fn default_convergence_threshold() -> f64 {
    0.01
}

const fn default_max_iterations() -> usize {
    100
}

const fn default_convergence_patience() -> usize {
    1
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            tournament_size: default_tournament_size(),
            elitism_count: default_elitism_count(),
            reflection_model: default_reflection_model(),
            max_prompt_length: default_max_prompt_length(),
            budget: default_budget(),
            convergence_threshold: default_convergence_threshold(),
            max_iterations: default_max_iterations(),
            convergence_patience: default_convergence_patience(),
        }
    }
}

impl OptimizationConfig {
    /// Number of generations the run may produce after generation 0.
    pub fn effective_generations(&self) -> usize {
        self.generations.min(self.max_iterations)
    }

    /// Check every bound; the first violation is reported.
    pub fn validate(&self) -> OptimizationResult<()> {
        let invalid = |msg: String| Err(OptimizationError::InvalidConfig(msg));

        if self.population_size < 2 {
            return invalid(format!(
                "population_size must be at least 2, got {}",
                self.population_size
            ));
        }
        if self.generations < 1 {
            return invalid("generations must be at least 1".to_string());
        }
        if self.max_iterations < 1 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return invalid(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return invalid(format!(
                "crossover_rate must be within [0, 1], got {}",
                self.crossover_rate
            ));
        }
        if self.tournament_size < 1 || self.tournament_size > self.population_size {
            return invalid(format!(
                "tournament_size must be within [1, {}], got {}",
                self.population_size, self.tournament_size
            ));
        }
        if self.elitism_count >= self.population_size {
            return invalid(format!(
                "elitism_count ({}) must be less than population_size ({})",
                self.elitism_count, self.population_size
            ));
        }
        if !self.budget.is_finite() || self.budget <= 0.0 {
            return invalid(format!("budget must be positive, got {}", self.budget));
        }
        if self.max_prompt_length == 0 {
            return invalid("max_prompt_length must be at least 1".to_string());
        }
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return invalid(format!(
                "convergence_threshold must be non-negative, got {}",
                self.convergence_threshold
            ));
        }
        if self.convergence_patience < 1 {
            return invalid("convergence_patience must be at least 1".to_string());
        }
        if self.reflection_model.trim().is_empty() {
            return invalid("reflection_model cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Truncate `text` to at most `max_chars` characters.
pub fn truncate_prompt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Candidate prompt text for each prompt parameter, keyed by parameter id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genome {
    prompts: BTreeMap<Uuid, String>,
}

impl Genome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_prompts(prompts: impl IntoIterator<Item = (Uuid, String)>) -> Self {
        Self {
            prompts: prompts.into_iter().collect(),
        }
    }

    pub fn get(&self, parameter_id: &Uuid) -> Option<&str> {
        self.prompts.get(parameter_id).map(String::as_str)
    }

    pub fn set(&mut self, parameter_id: Uuid, text: String) {
        self.prompts.insert(parameter_id, text);
    }

    /// Parameter ids in ascending order.
    pub fn parameter_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.prompts.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &str)> {
        self.prompts.iter().map(|(id, text)| (id, text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Copy with every prompt cut to `max_chars` characters.
    pub fn truncated(&self, max_chars: usize) -> Self {
        Self {
            prompts: self
                .prompts
                .iter()
                .map(|(id, text)| (*id, truncate_prompt(text, max_chars)))
                .collect(),
        }
    }
}

/// How a genome obtained its fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// The evaluation capability returned a score
    Scored,
    /// The evaluation capability errored
    Failed,
    /// Not evaluated because the budget ran out
    Skipped,
}

impl fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scored => "scored",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// A genome together with its fitness and the cost of scoring it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredGenome {
    pub genome: Genome,
    pub fitness: f64,
    pub cost: f64,
    pub outcome: EvaluationOutcome,
}

impl ScoredGenome {
    pub const fn scored(genome: Genome, fitness: f64, cost: f64) -> Self {
        Self {
            genome,
            fitness,
            cost,
            outcome: EvaluationOutcome::Scored,
        }
    }

    pub const fn failed(genome: Genome) -> Self {
        Self {
            genome,
            fitness: WORST_FITNESS,
            cost: 0.0,
            outcome: EvaluationOutcome::Failed,
        }
    }

    pub const fn skipped(genome: Genome) -> Self {
        Self {
            genome,
            fitness: WORST_FITNESS,
            cost: 0.0,
            outcome: EvaluationOutcome::Skipped,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.outcome == EvaluationOutcome::Scored
    }
}

/// One scored population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// 0-based position in the session
    pub index: usize,
    pub individuals: Vec<ScoredGenome>,
    pub best_fitness: f64,
    /// Mean over successfully scored individuals
    pub mean_fitness: f64,
    /// Evaluations performed for this generation (elites are not re-evaluated)
    pub evaluations: usize,
    pub created_at: DateTime<Utc>,
}

impl Generation {
    pub fn new(index: usize, individuals: Vec<ScoredGenome>, evaluations: usize) -> Self {
        let best_fitness = individuals
            .iter()
            .map(|individual| individual.fitness)
            .fold(WORST_FITNESS, f64::max);

        let scored: Vec<f64> = individuals
            .iter()
            .filter(|individual| individual.is_scored())
            .map(|individual| individual.fitness)
            .collect();
        let mean_fitness = if scored.is_empty() {
            WORST_FITNESS
        } else {
            scored.iter().sum::<f64>() / scored.len() as f64
        };

        Self {
            index,
            individuals,
            best_fitness,
            mean_fitness,
            evaluations,
            created_at: Utc::now(),
        }
    }

    /// First individual with the highest fitness.
    pub fn best_individual(&self) -> Option<&ScoredGenome> {
        self.individuals.iter().fold(None, |best, individual| match best {
            Some(current) if current.fitness >= individual.fitness => Some(current),
            _ => Some(individual),
        })
    }

    /// Individuals ordered by fitness, highest first; ties keep population order.
    pub fn ranked(&self) -> Vec<&ScoredGenome> {
        let mut ranked: Vec<&ScoredGenome> = self.individuals.iter().collect();
        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        ranked
    }

    pub fn size(&self) -> usize {
        self.individuals.len()
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created with a seeded population, not yet executed
    Created,
    /// A run owns the session and appends generations
    Running,
    /// Finished normally; final prompts were written back
    Completed,
    /// The run hit an unexpected error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OptimizationError::Serialization(format!(
                "unknown session status '{other}'"
            ))),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `min(generations, max_iterations)` generations were produced
    GenerationLimit,
    /// Best fitness plateaued for `convergence_patience` generations
    Converged,
    /// The next evaluation would have exceeded the budget
    BudgetExhausted,
}

impl StopReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerationLimit => "generation_limit",
            Self::Converged => "converged",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopReason {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generation_limit" => Ok(Self::GenerationLimit),
            "converged" => Ok(Self::Converged),
            "budget_exhausted" => Ok(Self::BudgetExhausted),
            other => Err(OptimizationError::Serialization(format!(
                "unknown stop reason '{other}'"
            ))),
        }
    }
}

/// Authorizes one execution instance to write progress for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunToken {
    pub session_id: Uuid,
    pub run_id: Uuid,
}

/// One evolutionary search over a module's prompt parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSession {
    pub id: Uuid,
    pub user_id: String,
    pub module_id: String,
    pub config: OptimizationConfig,
    pub prompt_parameter_ids: Vec<Uuid>,
    pub status: SessionStatus,

    /// Unscored genomes evaluated as generation 0
    pub seed_population: Vec<Genome>,

    /// Append-only; generation 0 is the scored seed population
    pub generations: Vec<Generation>,

    pub consumed_budget: f64,

    /// Best genome seen across all generations
    pub best_genome: Option<ScoredGenome>,

    pub stop_reason: Option<StopReason>,

    /// Run id of the execution currently allowed to write
    pub active_run: Option<Uuid>,

    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OptimizationSession {
    pub fn new(
        user_id: String,
        module_id: String,
        config: OptimizationConfig,
        prompt_parameter_ids: Vec<Uuid>,
        seed_population: Vec<Genome>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            module_id,
            config,
            prompt_parameter_ids,
            status: SessionStatus::Created,
            seed_population,
            generations: Vec::new(),
            consumed_budget: 0.0,
            best_genome: None,
            stop_reason: None,
            active_run: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn latest_generation(&self) -> Option<&Generation> {
        self.generations.last()
    }

    /// Best fitness of each generation in order.
    pub fn best_fitness_history(&self) -> Vec<f64> {
        self.generations.iter().map(|g| g.best_fitness).collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `token` is the run currently allowed to write.
    pub fn accepts(&self, token: &RunToken) -> bool {
        self.id == token.session_id
            && self.status == SessionStatus::Running
            && self.active_run == Some(token.run_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One page of sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub items: Vec<OptimizationSession>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(fitness: f64) -> ScoredGenome {
        ScoredGenome::scored(Genome::new(), fitness, 1.0)
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = OptimizationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_generations(), 5);
    }

    #[test]
    fn test_config_rejects_out_of_range_values() {
        let cases = [
            OptimizationConfig {
                population_size: 1,
                elitism_count: 0,
                tournament_size: 1,
                ..Default::default()
            },
            OptimizationConfig {
                mutation_rate: 1.5,
                ..Default::default()
            },
            OptimizationConfig {
                crossover_rate: -0.1,
                ..Default::default()
            },
            OptimizationConfig {
                elitism_count: 10,
                ..Default::default()
            },
            OptimizationConfig {
                tournament_size: 11,
                ..Default::default()
            },
            OptimizationConfig {
                budget: 0.0,
                ..Default::default()
            },
            OptimizationConfig {
                generations: 0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(OptimizationError::InvalidConfig(_))),
                "expected InvalidConfig for {config:?}"
            );
        }
    }

    #[test]
    fn test_effective_generations_respects_max_iterations() {
        let config = OptimizationConfig {
            generations: 50,
            max_iterations: 7,
            ..Default::default()
        };
        assert_eq!(config.effective_generations(), 7);
    }

    #[test]
    fn test_truncate_prompt_counts_characters() {
        assert_eq!(truncate_prompt("héllo wörld", 5), "héllo");
        assert_eq!(truncate_prompt("short", 10), "short");
        assert_eq!(truncate_prompt("", 3), "");
    }

    #[test]
    fn test_genome_serializes_as_map() {
        let id = Uuid::new_v4();
        let genome = Genome::from_prompts([(id, "Answer briefly.".to_string())]);
        let json = serde_json::to_value(&genome).unwrap();
        assert_eq!(json[id.to_string()], "Answer briefly.");

        let back: Genome = serde_json::from_value(json).unwrap();
        assert_eq!(back, genome);
    }

    #[test]
    fn test_generation_statistics_ignore_unscored_for_mean() {
        let generation = Generation::new(
            0,
            vec![
                scored(0.2),
                scored(0.6),
                ScoredGenome::failed(Genome::new()),
                ScoredGenome::skipped(Genome::new()),
            ],
            3,
        );

        assert!((generation.best_fitness - 0.6).abs() < f64::EPSILON);
        assert!((generation.mean_fitness - 0.4).abs() < 1e-12);
        assert_eq!(generation.size(), 4);
    }

    #[test]
    fn test_best_individual_prefers_first_on_tie() {
        let id = Uuid::new_v4();
        let first = ScoredGenome::scored(Genome::from_prompts([(id, "a".into())]), 0.5, 1.0);
        let second = ScoredGenome::scored(Genome::from_prompts([(id, "b".into())]), 0.5, 1.0);
        let generation = Generation::new(0, vec![scored(0.1), first.clone(), second], 3);

        assert_eq!(generation.best_individual(), Some(&first));
        assert_eq!(generation.ranked()[0], &first);
    }

    #[test]
    fn test_session_status_round_trip_and_terminality() {
        for status in [
            SessionStatus::Created,
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_session_accepts_only_active_run() {
        let mut session = OptimizationSession::new(
            "alice".into(),
            "qa".into(),
            OptimizationConfig::default(),
            vec![],
            vec![],
        );
        let token = RunToken {
            session_id: session.id,
            run_id: Uuid::new_v4(),
        };
        assert!(!session.accepts(&token));

        session.status = SessionStatus::Running;
        session.active_run = Some(token.run_id);
        assert!(session.accepts(&token));

        session.active_run = Some(Uuid::new_v4());
        assert!(!session.accepts(&token));
    }
}
