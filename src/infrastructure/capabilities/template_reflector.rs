use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

use crate::domain::errors::CapabilityError;
use crate::domain::ports::Reflector;

/// Reflection model id of the offline template reflector
pub const TEMPLATE_REFLECTION_MODEL: &str = "template";

const INSTRUCTION_PREFIXES: [&str; 12] = [
    "Be specific and detailed in your response.",
    "Provide concrete examples in your answer.",
    "Focus on accuracy and precision.",
    "Keep your response concise and to the point.",
    "Structure your response clearly with headings.",
    "Include relevant data and statistics.",
    "As an expert in this field, answer the following.",
    "Consider both theoretical and practical aspects.",
    "Address potential counterarguments.",
    "Think step by step before answering.",
    "Explain your reasoning clearly.",
    "Provide evidence for your claims.",
];

/// Offline reflector that prefixes a randomly chosen instruction.
///
/// The directive is ignored.
pub struct TemplateReflector {
    rng: Mutex<StdRng>,
}

impl TemplateReflector {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }

    pub fn prefixes() -> &'static [&'static str] {
        &INSTRUCTION_PREFIXES
    }
}

impl Default for TemplateReflector {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Reflector for TemplateReflector {
    async fn rewrite(&self, prompt: &str, _directive: &str) -> Result<String, CapabilityError> {
        let prefix = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| CapabilityError::Reflection("template rng poisoned".to_string()))?;
            INSTRUCTION_PREFIXES.choose(&mut *rng).copied().unwrap_or(INSTRUCTION_PREFIXES[0])
        };
        Ok(format!("{prefix} {prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rewrite_prefixes_known_phrase() {
        let reflector = TemplateReflector::new(Some(7));
        let rewritten = reflector.rewrite("Summarize the text.", "improve").await.unwrap();

        assert!(rewritten.ends_with(" Summarize the text."));
        assert!(TemplateReflector::prefixes()
            .iter()
            .any(|prefix| rewritten.starts_with(prefix)));
    }

    #[tokio::test]
    async fn test_same_seed_same_rewrites() {
        let first = TemplateReflector::new(Some(42));
        let second = TemplateReflector::new(Some(42));

        for _ in 0..5 {
            assert_eq!(
                first.rewrite("p", "d").await.unwrap(),
                second.rewrite("p", "d").await.unwrap()
            );
        }
    }
}
