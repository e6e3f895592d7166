//! Prompt parameters owned by an evaluatable module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named prompt slot of a module.
///
/// `final_prompt` is written only when an optimization session over this
/// parameter completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptParameter {
    pub id: Uuid,
    pub module_id: String,
    pub name: String,
    pub initial_prompt: String,
    pub final_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptParameter {
    pub fn new(module_id: String, name: String, initial_prompt: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            module_id,
            name,
            initial_prompt,
            final_prompt: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_final_prompt(&mut self, prompt: String) {
        self.final_prompt = Some(prompt);
        self.updated_at = Utc::now();
    }

    pub fn clear_final_prompt(&mut self) {
        self.final_prompt = None;
        self.updated_at = Utc::now();
    }
}
