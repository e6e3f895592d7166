//! GEPA - genetic-evolutionary prompt optimizer
//!
//! Searches for prompt text that maximizes a module's task score using a
//! generational genetic algorithm (tournament selection, crossover, elitism)
//! whose mutation operator is an LLM-driven reflection rewrite. Runs are
//! bounded by a generation cap, a convergence test and an evaluation budget,
//! and execute as background tasks whose progress is persisted per generation.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure models, errors and port traits
//! - **Service Layer** (`services`): The optimization engine and its lifecycle
//! - **Infrastructure Layer** (`infrastructure`): SQLite, Claude API, config, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gepa::infrastructure::memory::{InMemoryPromptParameterRepository, InMemorySessionRepository};
//! use gepa::services::{ModuleRegistry, OptimizationService};
//!
//! let service = OptimizationService::new(
//!     Arc::new(InMemorySessionRepository::default()),
//!     Arc::new(InMemoryPromptParameterRepository::default()),
//!     Arc::new(registry),
//!     ExecutionConfig::default(),
//! );
//! let param = service.register_prompt_parameter("qa", "system", "Answer the question.").await?;
//! let session = service.create_session("alice", "qa", OptimizationConfig::default(), vec![param.id]).await?;
//! service.execute(session.id).await;
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{CapabilityError, OptimizationError, OptimizationResult};
pub use domain::models::{
    Config, Generation, Genome, OptimizationConfig, OptimizationSession, PromptParameter,
    ScoredGenome, SessionStatus, StopReason,
};
pub use domain::ports::{Evaluation, Evaluator, PromptModule, Reflector};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ModuleRegistry, OptimizationService};
