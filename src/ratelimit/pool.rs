//! Bounded token pool shared between callers and the refill task.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free token count bounded by `0..=capacity`.
///
/// Every mutation is a compare-and-swap loop with an explicit bound check,
/// so concurrent takers and the refill task can never push the count below
/// zero or above capacity. Neither operation blocks.
#[derive(Debug)]
pub(crate) struct TokenPool {
    /// Tokens currently in the pool
    available: AtomicU64,
    /// Upper bound on `available`
    capacity: u64,
}

impl TokenPool {
    /// Create a pool that starts filled to `capacity`.
    pub fn full(capacity: u64) -> Self {
        Self {
            available: AtomicU64::new(capacity),
            capacity,
        }
    }

    /// Create a pool that starts empty.
    #[cfg(test)]
    pub fn empty(capacity: u64) -> Self {
        Self {
            available: AtomicU64::new(0),
            capacity,
        }
    }

    /// Remove one token.
    ///
    /// Returns `false` immediately if the pool is empty.
    pub fn try_take(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }

            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Insert one token.
    ///
    /// Returns `false` immediately if the pool is already at capacity.
    pub fn try_put(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return false;
            }

            match self.available.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Insert up to `count` tokens, one at a time.
    ///
    /// Stops at the first insertion that finds the pool full; the remaining
    /// attempts are dropped. Returns how many tokens were added.
    pub fn refill(&self, count: u64) -> u64 {
        let mut added = 0;
        while added < count && self.try_put() {
            added += 1;
        }
        added
    }

    /// Get the current number of tokens.
    pub fn available(&self) -> u64 {
        self.available.load(Ordering::Acquire)
    }

    /// Get the maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
