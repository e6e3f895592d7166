use async_trait::async_trait;

use crate::domain::errors::CapabilityError;
use crate::domain::models::Genome;
use crate::domain::ports::{Evaluation, Evaluator};

/// Module id the heuristic evaluator is registered under
pub const KEYWORD_HEURISTIC_MODULE: &str = "keyword-heuristic";

const SPECIFICITY_KEYWORDS: [&str; 5] = ["specific", "detailed", "accurate", "examples", "step by step"];
const KEYWORD_BONUS: usize = 50;
const NORMALIZATION_LENGTH: usize = 10_000;

/// Offline evaluator favouring longer prompts with specific instructions.
///
/// Deterministic, so runs against it are reproducible given a seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordHeuristicEvaluator;

impl KeywordHeuristicEvaluator {
    pub fn score(genome: &Genome) -> f64 {
        let weighted: usize = genome
            .iter()
            .map(|(_, text)| {
                let lower = text.to_lowercase();
                let bonus = SPECIFICITY_KEYWORDS
                    .iter()
                    .filter(|keyword| lower.contains(*keyword))
                    .count()
                    * KEYWORD_BONUS;
                text.chars().count() + bonus
            })
            .sum();

        weighted.min(NORMALIZATION_LENGTH) as f64 / NORMALIZATION_LENGTH as f64
    }
}

#[async_trait]
impl Evaluator for KeywordHeuristicEvaluator {
    async fn evaluate(&self, genome: &Genome) -> Result<Evaluation, CapabilityError> {
        Ok(Evaluation::new(Self::score(genome), 1.0))
    }
}
