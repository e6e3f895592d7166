use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OptimizationResult;
use crate::domain::models::PromptParameter;

/// Repository trait for prompt parameter persistence
///
/// The typed registry of prompt text: every parameter is addressed by id and
/// owned by exactly one module.
#[async_trait]
pub trait PromptParameterRepository: Send + Sync {
    /// Inserts a new parameter
    async fn insert(&self, parameter: &PromptParameter) -> OptimizationResult<()>;

    /// Retrieves a parameter by id
    async fn get(&self, id: Uuid) -> OptimizationResult<Option<PromptParameter>>;

    /// Lists the parameters owned by a module, ordered by name
    async fn list_by_module(&self, module_id: &str) -> OptimizationResult<Vec<PromptParameter>>;

    /// Writes the optimized prompt back to a parameter
    ///
    /// # Errors
    /// Returns `ParameterNotFound` if the parameter does not exist
    async fn set_final_prompt(&self, id: Uuid, prompt: &str) -> OptimizationResult<()>;

    /// Removes the optimized prompt from a parameter
    ///
    /// # Errors
    /// Returns `ParameterNotFound` if the parameter does not exist
    async fn clear_final_prompt(&self, id: Uuid) -> OptimizationResult<()>;
}
