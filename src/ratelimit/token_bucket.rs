//! Token bucket limiter with a background refill task.
//!
//! The bucket starts full. A single tokio task adds up to `refill_rate`
//! tokens on every tick of `refill_interval`; tokens that do not fit are
//! lost for that tick rather than carried over. Callers take one token per
//! admission check without ever blocking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::pool::TokenPool;
use crate::error::{BucketgateError, Result};

/// Handle to the running refill task.
struct RefillTask {
    /// One-shot stop signal
    stop_tx: oneshot::Sender<()>,
    /// Join handle used to wait for the task to exit
    handle: JoinHandle<()>,
}

/// A token bucket limiter.
///
/// Share it between callers behind an `Arc`. Dropping the last reference
/// also ends the refill task, because the stop signal's sender is dropped
/// with it.
pub struct TokenBucketLimiter {
    /// Token storage shared with the refill task
    pool: Arc<TokenPool>,
    /// Tokens added per tick
    refill_rate: u64,
    /// Time between ticks
    refill_interval: Duration,
    /// Present until `stop` is called
    refill_task: Mutex<Option<RefillTask>>,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("capacity", &self.pool.capacity())
            .field("available", &self.pool.available())
            .field("refill_rate", &self.refill_rate)
            .field("refill_interval", &self.refill_interval)
            .field("refilling", &self.is_refilling())
            .finish()
    }
}

impl TokenBucketLimiter {
    /// Create a full token bucket and start its refill task.
    ///
    /// Must be called from within a tokio runtime, which hosts the refill
    /// task. Parameters are validated before anything is spawned, so a
    /// failed construction never leaves a task behind.
    pub fn new(capacity: u64, refill_rate: u64, refill_interval: Duration) -> Result<Self> {
        Self::validate(capacity, refill_interval)?;

        let runtime = Handle::try_current().map_err(|e| {
            BucketgateError::Runtime(format!("token bucket refill needs a tokio runtime: {}", e))
        })?;

        let first_tick = Instant::now().checked_add(refill_interval).ok_or_else(|| {
            BucketgateError::Config(format!("refill_interval {:?} is too large", refill_interval))
        })?;

        let pool = Arc::new(TokenPool::full(capacity));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(refill_loop(
            pool.clone(),
            refill_rate,
            refill_interval,
            first_tick,
            stop_rx,
        ));

        info!(
            capacity = capacity,
            refill_rate = refill_rate,
            refill_interval = ?refill_interval,
            "Token bucket created"
        );

        Ok(Self {
            pool,
            refill_rate,
            refill_interval,
            refill_task: Mutex::new(Some(RefillTask { stop_tx, handle })),
        })
    }

    /// Check token bucket parameters without building a limiter.
    ///
    /// A negative refill rate cannot be expressed, so only capacity and
    /// interval are checked.
    pub fn validate(capacity: u64, refill_interval: Duration) -> Result<()> {
        if capacity == 0 {
            return Err(BucketgateError::Config("capacity must be greater than 0".to_string()));
        }
        if refill_interval.is_zero() {
            return Err(BucketgateError::Config(
                "refill_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Try to take one token for `request_id`.
    ///
    /// Never blocks. Returns `false` immediately when the bucket is empty;
    /// denial is the normal backpressure signal, not a fault.
    pub fn consume(&self, request_id: u64) -> bool {
        if self.pool.try_take() {
            trace!(
                request_id = request_id,
                available = self.pool.available(),
                "Request consumed a token"
            );
            true
        } else {
            trace!(request_id = request_id, "Request denied, no token available");
            false
        }
    }

    /// Stop the refill task and wait for it to exit.
    ///
    /// The token count is left as it is; consumes keep working until the
    /// bucket is drained.
    ///
    /// # Panics
    ///
    /// The stop signal is single-use. Calling `stop` a second time is a
    /// caller bug and panics.
    pub async fn stop(&self) {
        let task = self.refill_task.lock().take();
        let Some(RefillTask { stop_tx, handle }) = task else {
            panic!("TokenBucketLimiter::stop called on an already stopped limiter");
        };

        // Err means the task has already exited
        let _ = stop_tx.send(());

        if let Err(e) = handle.await {
            warn!(error = %e, "Refill task ended abnormally");
        }

        info!(available = self.pool.available(), "Token bucket refill stopped");
    }

    /// Whether the refill task is still running.
    pub fn is_refilling(&self) -> bool {
        self.refill_task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    /// Get the current number of tokens.
    pub fn available(&self) -> u64 {
        self.pool.available()
    }

    /// Get the maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.pool.capacity()
    }

    /// Get the number of tokens added per tick.
    pub fn refill_rate(&self) -> u64 {
        self.refill_rate
    }

    /// Get the time between refill ticks.
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }
}

/// Refill loop run by the background task.
///
/// Exits when the stop signal fires or its sender is dropped.
async fn refill_loop(
    pool: Arc<TokenPool>,
    refill_rate: u64,
    refill_interval: Duration,
    first_tick: Instant,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(first_tick, refill_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("Refill task received stop signal");
                break;
            }
            _ = ticker.tick() => {
                let added = pool.refill(refill_rate);
                if added == 0 {
                    trace!(available = pool.available(), "Bucket full, no tokens added");
                } else {
                    debug!(
                        added = added,
                        refill_rate = refill_rate,
                        available = pool.available(),
                        "Refilled tokens"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sleep just past `ticks` refill ticks on the paused clock.
    async fn wait_ticks(limiter: &TokenBucketLimiter, ticks: u32) {
        tokio::time::sleep(limiter.refill_interval() * ticks + Duration::from_millis(1)).await;
    }

    fn drain(limiter: &TokenBucketLimiter) -> usize {
        (0..).take_while(|id| limiter.consume(*id)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_full() {
        let limiter = TokenBucketLimiter::new(5, 2, Duration::from_secs(2)).unwrap();

        assert_eq!(limiter.available(), 5);
        assert_eq!(limiter.capacity(), 5);
        assert!(limiter.is_refilling());

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = TokenBucketLimiter::new(5, 2, Duration::from_secs(2)).unwrap();

        let results: Vec<bool> = (1..=10).map(|id| limiter.consume(id)).collect();
        assert_eq!(results, [true, true, true, true, true, false, false, false, false, false]);

        wait_ticks(&limiter, 1).await;

        assert!(limiter.consume(11));
        assert!(limiter.consume(12));
        assert!(!limiter.consume(13));

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_refill_before_first_tick() {
        let limiter = TokenBucketLimiter::new(3, 3, Duration::from_secs(1)).unwrap();
        assert_eq!(drain(&limiter), 3);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!limiter.consume(1));

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_bounded_by_free_space() {
        let limiter = TokenBucketLimiter::new(5, 10, Duration::from_millis(100)).unwrap();

        for id in 0..3 {
            assert!(limiter.consume(id));
        }
        assert_eq!(limiter.available(), 2);

        // Rate is 10 but only 3 slots are free
        wait_ticks(&limiter, 1).await;
        assert_eq!(limiter.available(), 5);
        assert_eq!(drain(&limiter), 5);

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_bounded_by_rate() {
        let limiter = TokenBucketLimiter::new(5, 1, Duration::from_millis(100)).unwrap();
        assert_eq!(drain(&limiter), 5);

        wait_ticks(&limiter, 1).await;
        assert_eq!(drain(&limiter), 1);

        wait_ticks(&limiter, 3).await;
        assert_eq!(drain(&limiter), 3);

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_refill_is_not_banked() {
        let limiter = TokenBucketLimiter::new(4, 1, Duration::from_millis(100)).unwrap();

        // Three ticks while full, all of them discarded
        wait_ticks(&limiter, 3).await;
        assert_eq!(limiter.available(), 4);

        assert_eq!(drain(&limiter), 4);
        wait_ticks(&limiter, 1).await;
        assert_eq!(limiter.available(), 1);

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_refill_rate_never_refills() {
        let limiter = TokenBucketLimiter::new(2, 0, Duration::from_millis(10)).unwrap();
        assert_eq!(drain(&limiter), 2);

        wait_ticks(&limiter, 5).await;
        assert_eq!(limiter.available(), 0);
        assert!(limiter.is_refilling());

        limiter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_tokens_and_ends_refill() {
        let limiter = TokenBucketLimiter::new(5, 2, Duration::from_secs(1)).unwrap();
        limiter.consume(1);
        limiter.consume(2);

        limiter.stop().await;
        assert!(!limiter.is_refilling());
        assert_eq!(limiter.available(), 3);

        // Consumes still work until the bucket is empty
        assert_eq!(drain(&limiter), 3);
        wait_ticks(&limiter, 3).await;
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "already stopped")]
    async fn test_double_stop_panics() {
        let limiter = TokenBucketLimiter::new(1, 1, Duration::from_secs(1)).unwrap();
        limiter.stop().await;
        limiter.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let err = TokenBucketLimiter::new(0, 1, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));

        let err = TokenBucketLimiter::new(5, 1, Duration::ZERO).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_validation_runs_before_runtime_lookup() {
        let err = TokenBucketLimiter::new(0, 1, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = TokenBucketLimiter::new(5, 1, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BucketgateError::Runtime(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_over_allocation_under_contention() {
        const CAPACITY: u64 = 100;
        const CALLERS: u64 = 8;
        const CALLS_EACH: u64 = 50;

        let limiter =
            Arc::new(TokenBucketLimiter::new(CAPACITY, 0, Duration::from_secs(3600)).unwrap());

        let handles: Vec<_> = (0..CALLERS)
            .map(|caller| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let mut granted = 0u64;
                    for call in 0..CALLS_EACH {
                        if limiter.consume(caller * CALLS_EACH + call) {
                            granted += 1;
                        }
                        assert!(limiter.available() <= CAPACITY);
                    }
                    granted
                })
            })
            .collect();

        let granted: u64 = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .sum();

        assert_eq!(granted, CAPACITY);
        assert_eq!(CALLERS * CALLS_EACH - granted, 300);
        assert_eq!(limiter.available(), 0);

        limiter.stop().await;
    }
}
