//! Leaky bucket limiter with lazy replenishment.
//!
//! There is no background task. Every admission check first pays out the
//! credits earned since the last payout, then tries to spend one.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, trace};

use crate::error::{BucketgateError, Result};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Mutable state, only touched under the limiter's lock.
#[derive(Debug)]
struct LeakState {
    /// Credits currently available
    tokens: u64,
    /// Point up to which replenishment has been paid out
    last_leak: Instant,
}

impl LeakState {
    /// Credit every whole interval elapsed since `last_leak`.
    ///
    /// `last_leak` moves forward by exactly the intervals credited, so the
    /// leftover fraction of an interval carries into the next call.
    fn leak(&mut self, now: Instant, capacity: u64, leak_interval: Duration) {
        let elapsed = now.saturating_duration_since(self.last_leak);
        let interval_nanos = leak_interval.as_nanos();
        let intervals = elapsed.as_nanos() / interval_nanos;
        if intervals == 0 {
            return;
        }

        let credited = u64::try_from(intervals).unwrap_or(u64::MAX);
        self.tokens = self.tokens.saturating_add(credited).min(capacity);

        let leftover = duration_from_nanos(elapsed.as_nanos() % interval_nanos);
        self.last_leak += elapsed - leftover;
    }

    /// Credits `leak` would produce at `now`, without changing anything.
    fn peek(&self, now: Instant, capacity: u64, leak_interval: Duration) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_leak);
        let intervals = elapsed.as_nanos() / leak_interval.as_nanos();
        let credited = u64::try_from(intervals).unwrap_or(u64::MAX);
        self.tokens.saturating_add(credited).min(capacity)
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // Always below one billion
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}

/// A leaky bucket limiter.
///
/// All calls to [`allow`](Self::allow) are serialized by a short critical
/// section; none of them block on I/O or wait for time to pass.
#[derive(Debug)]
pub struct LeakyBucketLimiter {
    /// Maximum credits held at once
    capacity: u64,
    /// Time it takes to earn back one credit
    leak_interval: Duration,
    /// Credits and payout timestamp
    state: Mutex<LeakState>,
}

impl LeakyBucketLimiter {
    /// Create a full leaky bucket.
    pub fn new(capacity: u64, leak_interval: Duration) -> Result<Self> {
        Self::validate(capacity, leak_interval)?;

        info!(
            capacity = capacity,
            leak_interval = ?leak_interval,
            "Leaky bucket created"
        );

        Ok(Self {
            capacity,
            leak_interval,
            state: Mutex::new(LeakState {
                tokens: capacity,
                last_leak: Instant::now(),
            }),
        })
    }

    /// Check leaky bucket parameters without building a limiter.
    pub fn validate(capacity: u64, leak_interval: Duration) -> Result<()> {
        if capacity == 0 {
            return Err(BucketgateError::Config("capacity must be greater than 0".to_string()));
        }
        if leak_interval.is_zero() {
            return Err(BucketgateError::Config("leak_interval must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Replenish lazily, then try to spend one credit.
    ///
    /// Returns `false` when no credit is left; calling again without time
    /// passing changes nothing.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        state.leak(Instant::now(), self.capacity, self.leak_interval);

        if state.tokens > 0 {
            state.tokens -= 1;
            trace!(tokens = state.tokens, "Request allowed");
            true
        } else {
            trace!("Request denied, bucket empty");
            false
        }
    }

    /// Get the credits an `allow` call would see right now.
    ///
    /// This is a snapshot taken under the lock; it does not pay anything out.
    pub fn available(&self) -> u64 {
        let state = self.state.lock();
        state.peek(Instant::now(), self.capacity, self.leak_interval)
    }

    /// Get the maximum number of credits.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the time it takes to earn back one credit.
    pub fn leak_interval(&self) -> Duration {
        self.leak_interval
    }
}
