//! Reflection capability backed by the Claude Messages API.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::client::ClaudeClientImpl;
use super::errors::ClaudeApiError;
use super::types::{Message, MessageRequest};
use crate::domain::errors::CapabilityError;
use crate::domain::ports::Reflector;

const SYSTEM_PROMPT: &str = "You improve prompts for language model programs. \
Respond with the rewritten prompt only, without commentary, quotes or headings.";

/// Rewrites prompt text by asking a Claude model.
pub struct ClaudeReflector {
    client: Arc<ClaudeClientImpl>,
    model: String,
    max_tokens: u32,
}

impl ClaudeReflector {
    pub fn new(client: Arc<ClaudeClientImpl>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str, directive: &str) -> MessageRequest {
        let content = format!(
            "{directive}\n\nFocus on clarity and specificity, task understanding, \
             and more effective instructions.\n\nCurrent prompt:\n<prompt>\n{prompt}\n</prompt>"
        );

        MessageRequest {
            model: self.model.clone(),
            messages: vec![Message::user(content)],
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            temperature: Some(0.7),
        }
    }
}

#[async_trait]
impl Reflector for ClaudeReflector {
    async fn rewrite(&self, prompt: &str, directive: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .send_message(&self.request(prompt, directive))
            .await
            .map_err(|err| {
                warn!(model = %self.model, error = %err, "reflection request failed");
                CapabilityError::from(err)
            })?;

        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(ClaudeApiError::EmptyResponse(format!("model {} returned no text", self.model)).into());
        }
        Ok(text)
    }
}
