use super::errors::ClaudeApiError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use super::types::{MessageRequest, MessageResponse};
use anyhow::{Context, Result};
use reqwest::{header, Client as ReqwestClient};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::models::ReflectionConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Claude HTTP client
#[derive(Debug, Clone)]
pub struct ClaudeClientConfig {
    /// Anthropic API key
    pub api_key: String,

    /// Base URL for the Claude API
    pub base_url: String,

    /// Requests per second allowed
    pub rate_limit_rps: f64,

    /// Maximum retry attempts
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    pub max_backoff_ms: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClaudeClientConfig {
    /// Build client settings from the reflection section, with a resolved key
    pub fn from_reflection(config: &ReflectionConfig, api_key: String) -> Self {
        Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limit_rps: config.rate_limit_rps,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            timeout_secs: config.timeout_secs,
        }
    }
}

/// HTTP client for the Claude Messages API
///
/// Requests pass through a token bucket and are retried on transient
/// failures with exponential backoff.
pub struct ClaudeClientImpl {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
}

impl ClaudeClientImpl {
    pub fn new(config: ClaudeClientConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rps),
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        })
    }

    /// Send a message request, rate limited and retried
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn send_message(&self, request: &MessageRequest) -> Result<MessageResponse, ClaudeApiError> {
        self.retry_policy
            .execute(|| async {
                self.rate_limiter.acquire().await;
                self.send_request(request).await
            })
            .await
    }

    async fn send_request(&self, request: &MessageRequest) -> Result<MessageResponse, ClaudeApiError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClaudeApiError::Timeout
                } else {
                    ClaudeApiError::NetworkError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            debug!(status = %status, "Claude API returned an error status");
            return Err(ClaudeApiError::from_status(status, body));
        }

        let bytes = response.bytes().await?;
        let message: MessageResponse = serde_json::from_slice(&bytes)?;
        debug!(
            input_tokens = message.usage.input_tokens,
            output_tokens = message.usage.output_tokens,
            "Claude API request completed"
        );
        Ok(message)
    }
}
