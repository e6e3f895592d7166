//! Capability ports consumed by the optimizer.
//!
//! A module under optimization exposes two capabilities: scoring a genome
//! ([`Evaluator`]) and rewriting prompt text ([`Reflector`]). [`PromptModule`]
//! is the named set of both and is what the engine is injected with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::errors::CapabilityError;
use crate::domain::models::Genome;

/// Result of scoring one genome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Fitness, higher is better
    pub score: f64,
    /// Budget units consumed by this evaluation
    pub cost: f64,
}

impl Evaluation {
    pub const fn new(score: f64, cost: f64) -> Self {
        Self { score, cost }
    }
}

/// Scores a genome against a module's task.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, genome: &Genome) -> Result<Evaluation, CapabilityError>;
}

/// Rewrites prompt text following a directive.
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn rewrite(&self, prompt: &str, directive: &str) -> Result<String, CapabilityError>;
}

/// The capability set {evaluate, rewrite} of an optimizable module.
#[async_trait]
pub trait PromptModule: Send + Sync {
    async fn evaluate(&self, genome: &Genome) -> Result<Evaluation, CapabilityError>;

    async fn rewrite(&self, prompt: &str, directive: &str) -> Result<String, CapabilityError>;
}

/// A [`PromptModule`] assembled from a separate evaluator and reflector.
#[derive(Clone)]
pub struct ComposedModule {
    evaluator: Arc<dyn Evaluator>,
    reflector: Arc<dyn Reflector>,
}

impl ComposedModule {
    pub fn new(evaluator: Arc<dyn Evaluator>, reflector: Arc<dyn Reflector>) -> Self {
        Self {
            evaluator,
            reflector,
        }
    }
}

#[async_trait]
impl PromptModule for ComposedModule {
    async fn evaluate(&self, genome: &Genome) -> Result<Evaluation, CapabilityError> {
        self.evaluator.evaluate(genome).await
    }

    async fn rewrite(&self, prompt: &str, directive: &str) -> Result<String, CapabilityError> {
        self.reflector.rewrite(prompt, directive).await
    }
}
