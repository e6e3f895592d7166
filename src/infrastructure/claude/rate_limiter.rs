use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token bucket rate limiter for API request throttling
///
/// Capacity equals the refill rate, so up to one second of requests may be
/// sent as a burst.
#[derive(Clone)]
pub struct TokenBucketRateLimiter {
    state: Arc<Mutex<BucketState>>,
    capacity: f64,
    refill_rate: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    /// Create a new rate limiter allowing `rate_limit_rps` requests per second.
    ///
    /// Non-positive rates are clamped to a small positive rate.
    pub fn new(rate_limit_rps: f64) -> Self {
        let rate = if rate_limit_rps.is_finite() && rate_limit_rps > 0.0 {
            rate_limit_rps
        } else {
            0.1
        };

        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: rate,
                last_refill: Instant::now(),
            })),
            capacity: rate,
            refill_rate: rate,
        }
    }

    /// Acquire a token from the bucket, waiting if necessary
    pub async fn acquire(&self) {
        loop {
            let wait_duration = {
                let mut state = self.state.lock().await;

                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                let available = (state.tokens + elapsed * self.refill_rate).min(self.capacity);

                if available >= 1.0 {
                    state.tokens = available - 1.0;
                    state.last_refill = now;
                    return;
                }

                let tokens_needed = 1.0 - available;
                Duration::from_secs_f64((tokens_needed / self.refill_rate).max(0.01))
            };

            sleep(wait_duration).await;
        }
    }

    /// Get the current number of available tokens (for testing/monitoring)
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = Instant::now().duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}
