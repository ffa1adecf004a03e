//! Limiter trait for abstracting the token bucket and leaky bucket strategies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::leaky_bucket::LeakyBucketLimiter;
use super::token_bucket::TokenBucketLimiter;

/// Replenishment strategy of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Background refill on a fixed tick
    TokenBucket,
    /// Lazy refill computed on each check
    LeakyBucket,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::TokenBucket => write!(f, "token_bucket"),
            Strategy::LeakyBucket => write!(f, "leaky_bucket"),
        }
    }
}

/// Trait for limiter implementations.
///
/// Both strategies answer an admission check with a plain `bool`, so
/// callers can swap one for the other without changing how they react to
/// a denial.
pub trait Limiter: Send + Sync {
    /// Try to admit one request. Never blocks.
    fn try_admit(&self, request_id: u64) -> bool;

    /// Current number of tokens or credits.
    fn available(&self) -> u64;

    /// Maximum number of tokens or credits.
    fn capacity(&self) -> u64;

    /// The replenishment strategy.
    fn strategy(&self) -> Strategy;

    /// Time it takes to replenish.
    fn interval(&self) -> Duration;
}

impl Limiter for TokenBucketLimiter {
    fn try_admit(&self, request_id: u64) -> bool {
        self.consume(request_id)
    }

    fn available(&self) -> u64 {
        TokenBucketLimiter::available(self)
    }

    fn capacity(&self) -> u64 {
        TokenBucketLimiter::capacity(self)
    }

    fn strategy(&self) -> Strategy {
        Strategy::TokenBucket
    }

    fn interval(&self) -> Duration {
        self.refill_interval()
    }
}

impl Limiter for LeakyBucketLimiter {
    // The leaky bucket does not track request ids
    fn try_admit(&self, _request_id: u64) -> bool {
        self.allow()
    }

    fn available(&self) -> u64 {
        LeakyBucketLimiter::available(self)
    }

    fn capacity(&self) -> u64 {
        LeakyBucketLimiter::capacity(self)
    }

    fn strategy(&self) -> Strategy {
        Strategy::LeakyBucket
    }

    fn interval(&self) -> Duration {
        self.leak_interval()
    }
}
