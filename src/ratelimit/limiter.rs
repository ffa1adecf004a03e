//! Strategy-selecting rate limiter.

use std::time::Duration;
use tracing::info;

use super::backend::{Limiter, Strategy};
use super::leaky_bucket::LeakyBucketLimiter;
use super::token_bucket::TokenBucketLimiter;
use crate::config::LimiterConfig;
use crate::error::Result;

/// A limiter built from configuration.
///
/// Callers pick one strategy up front; every admission check then goes to
/// that strategy. Share it across tasks behind an `Arc`.
#[derive(Debug)]
pub enum RateLimiter {
    /// Token bucket with background refill
    TokenBucket(TokenBucketLimiter),
    /// Leaky bucket with lazy refill
    LeakyBucket(LeakyBucketLimiter),
}

impl RateLimiter {
    /// Build the limiter described by `config`.
    ///
    /// A token bucket must be built inside a tokio runtime.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let limiter = match config {
            LimiterConfig::TokenBucket(cfg) => RateLimiter::TokenBucket(TokenBucketLimiter::new(
                cfg.capacity,
                cfg.refill_rate,
                cfg.refill_interval(),
            )?),
            LimiterConfig::LeakyBucket(cfg) => RateLimiter::LeakyBucket(LeakyBucketLimiter::new(
                cfg.capacity,
                cfg.leak_interval(),
            )?),
        };

        info!(strategy = %limiter.strategy(), "Rate limiter initialized");
        Ok(limiter)
    }

    /// Stop background work.
    ///
    /// Stops the token bucket's refill task; the leaky bucket has none, so
    /// this is a no-op for it.
    ///
    /// # Panics
    ///
    /// Panics if a token bucket has already been stopped.
    pub async fn stop(&self) {
        match self {
            RateLimiter::TokenBucket(limiter) => limiter.stop().await,
            RateLimiter::LeakyBucket(_) => {}
        }
    }

    /// Get the underlying limiter as a trait object.
    pub fn as_limiter(&self) -> &dyn Limiter {
        match self {
            RateLimiter::TokenBucket(limiter) => limiter,
            RateLimiter::LeakyBucket(limiter) => limiter,
        }
    }
}

impl Limiter for RateLimiter {
    fn try_admit(&self, request_id: u64) -> bool {
        self.as_limiter().try_admit(request_id)
    }

    fn available(&self) -> u64 {
        self.as_limiter().available()
    }

    fn capacity(&self) -> u64 {
        self.as_limiter().capacity()
    }

    fn strategy(&self) -> Strategy {
        self.as_limiter().strategy()
    }

    fn interval(&self) -> Duration {
        self.as_limiter().interval()
    }
}
