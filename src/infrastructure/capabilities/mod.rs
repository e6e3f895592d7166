//! Built-in module capabilities and registry wiring
//!
//! - [`KeywordHeuristicEvaluator`]: offline scoring for the `keyword-heuristic` module
//! - [`TemplateReflector`]: offline rewriting under the `template` model
//! - Claude rewriting under the configured model name, when an API key is available

pub mod keyword_heuristic;
pub mod template_reflector;

pub use keyword_heuristic::{KeywordHeuristicEvaluator, KEYWORD_HEURISTIC_MODULE};
pub use template_reflector::{TemplateReflector, TEMPLATE_REFLECTION_MODEL};

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::models::Config;
use crate::infrastructure::claude::{ClaudeClientConfig, ClaudeClientImpl, ClaudeReflector};
use crate::services::ModuleRegistry;

/// Registry with every built-in capability the configuration enables
pub fn default_registry(config: &Config) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();

    registry.register_evaluator(KEYWORD_HEURISTIC_MODULE, Arc::new(KeywordHeuristicEvaluator));
    registry.register_reflector(
        TEMPLATE_REFLECTION_MODEL,
        Arc::new(TemplateReflector::new(config.execution.rng_seed)),
    );

    match config.reflection.resolve_api_key() {
        Some(api_key) => {
            let client_config = ClaudeClientConfig::from_reflection(&config.reflection, api_key);
            let client = Arc::new(ClaudeClientImpl::new(client_config)?);
            let reflector = ClaudeReflector::new(
                client,
                config.reflection.model.clone(),
                config.reflection.max_tokens,
            );
            info!(model = %reflector.model(), "Claude reflection enabled");
            registry.register_reflector(config.reflection.model.clone(), Arc::new(reflector));
        }
        None => debug!("no Anthropic API key configured, Claude reflection disabled"),
    }

    Ok(registry)
}
