//! Claude API integration used as a reflection capability
//!
//! Provides an HTTP client for the Anthropic Messages API with:
//! - Token bucket rate limiting
//! - Exponential backoff retry for transient errors
//! - A [`Reflector`](crate::domain::ports::Reflector) implementation

pub mod client;
pub mod errors;
pub mod rate_limiter;
pub mod reflector;
pub mod retry;
pub mod types;

pub use client::{ClaudeClientConfig, ClaudeClientImpl};
pub use errors::ClaudeApiError;
pub use rate_limiter::TokenBucketRateLimiter;
pub use reflector::ClaudeReflector;
pub use retry::RetryPolicy;
