//! Registry of optimizable modules and reflection capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::ports::{ComposedModule, Evaluator, PromptModule, Reflector};

/// Maps module ids to their capabilities and reflection model ids to reflectors.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn PromptModule>>,
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
    reflectors: HashMap<String, Arc<dyn Reflector>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module that brings its own evaluation and rewriting.
    pub fn register_module(&mut self, module_id: impl Into<String>, module: Arc<dyn PromptModule>) {
        self.modules.insert(module_id.into(), module);
    }

    /// Register an evaluator; rewriting comes from the session's reflection model.
    pub fn register_evaluator(&mut self, module_id: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(module_id.into(), evaluator);
    }

    pub fn register_reflector(&mut self, model: impl Into<String>, reflector: Arc<dyn Reflector>) {
        self.reflectors.insert(model.into(), reflector);
    }

    /// Capabilities for a session of `module_id` mutating through `reflection_model`.
    ///
    /// # Errors
    /// - `ModuleNotFound` if nothing is registered for `module_id`
    /// - `ReflectorNotFound` if the module needs a reflector that is not registered
    pub fn resolve(&self, module_id: &str, reflection_model: &str) -> OptimizationResult<Arc<dyn PromptModule>> {
        if let Some(module) = self.modules.get(module_id) {
            return Ok(Arc::clone(module));
        }

        let evaluator = self
            .evaluators
            .get(module_id)
            .ok_or_else(|| OptimizationError::ModuleNotFound(module_id.to_string()))?;
        let reflector = self
            .reflectors
            .get(reflection_model)
            .ok_or_else(|| OptimizationError::ReflectorNotFound(reflection_model.to_string()))?;

        Ok(Arc::new(ComposedModule::new(
            Arc::clone(evaluator),
            Arc::clone(reflector),
        )))
    }

    /// Sorted ids of every module that can be optimized.
    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .modules
            .keys()
            .chain(self.evaluators.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Sorted ids of the registered reflection models.
    pub fn reflection_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.reflectors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::CapabilityError;
    use crate::domain::models::Genome;
    use crate::domain::ports::Evaluation;
    use async_trait::async_trait;

    struct Fixed(f64);

    #[async_trait]
    impl Evaluator for Fixed {
        async fn evaluate(&self, _genome: &Genome) -> Result<Evaluation, CapabilityError> {
            Ok(Evaluation::new(self.0, 1.0))
        }
    }

    struct Echo;

    #[async_trait]
    impl Reflector for Echo {
        async fn rewrite(&self, prompt: &str, _directive: &str) -> Result<String, CapabilityError> {
            Ok(prompt.to_string())
        }
    }

    #[async_trait]
    impl PromptModule for Fixed {
        async fn evaluate(&self, _genome: &Genome) -> Result<Evaluation, CapabilityError> {
            Ok(Evaluation::new(self.0, 2.0))
        }

        async fn rewrite(&self, prompt: &str, _directive: &str) -> Result<String, CapabilityError> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn test_composes_evaluator_with_reflector() {
        let mut registry = ModuleRegistry::new();
        registry.register_evaluator("qa", Arc::new(Fixed(0.4)) as Arc<dyn Evaluator>);
        registry.register_reflector("template", Arc::new(Echo));

        let module = registry.resolve("qa", "template").unwrap();
        let evaluation = module.evaluate(&Genome::new()).await.unwrap();
        assert!((evaluation.cost - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_full_module_takes_precedence() {
        let mut registry = ModuleRegistry::new();
        registry.register_evaluator("qa", Arc::new(Fixed(0.4)) as Arc<dyn Evaluator>);
        registry.register_module("qa", Arc::new(Fixed(0.9)) as Arc<dyn PromptModule>);

        let module = registry.resolve("qa", "missing").unwrap();
        let evaluation = module.evaluate(&Genome::new()).await.unwrap();
        assert!((evaluation.cost - 2.0).abs() < f64::EPSILON);
        assert_eq!(registry.module_ids(), vec!["qa".to_string()]);
    }

    #[test]
    fn test_missing_entries() {
        let mut registry = ModuleRegistry::new();
        assert!(matches!(
            registry.resolve("qa", "template"),
            Err(OptimizationError::ModuleNotFound(_))
        ));

        registry.register_evaluator("qa", Arc::new(Fixed(0.4)) as Arc<dyn Evaluator>);
        assert!(matches!(
            registry.resolve("qa", "template"),
            Err(OptimizationError::ReflectorNotFound(_))
        ));
    }
}
