//! Demonstration drivers that push requests through a limiter.
//!
//! The limiter never retries on its own; these drivers show two caller
//! policies: retry after a delay, or fire bursts and accept the denials.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::DemoConfig;
use crate::ratelimit::{Limiter, Strategy};

/// Outcome of a demonstration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    /// Strategy of the limiter that was driven
    pub strategy: Strategy,
    /// Admission checks that returned `true`
    pub admitted: u64,
    /// Admission checks that returned `false`
    pub denied: u64,
    /// Wall time of the run in milliseconds
    pub elapsed_ms: u64,
}

/// Process requests in order, retrying each denied request after a delay.
///
/// Every admitted request spawns simulated work of `work_ms`; the run ends
/// once all requests are admitted and all work has finished.
pub async fn run_sequential<L>(limiter: &L, config: &DemoConfig) -> DemoReport
where
    L: Limiter + ?Sized,
{
    let started = Instant::now();
    let retry_delay = Duration::from_millis(config.retry_delay_ms);
    let work = Duration::from_millis(config.work_ms);

    let mut denied = 0;
    let mut in_flight = Vec::new();

    for request_id in 1..=config.requests {
        while !limiter.try_admit(request_id) {
            denied += 1;
            debug!(request_id = request_id, "Denied, retrying later");
            sleep(retry_delay).await;
        }

        info!(
            request_id = request_id,
            available = limiter.available(),
            "Request admitted"
        );
        in_flight.push(tokio::spawn(sleep(work)));
    }

    join_logged(in_flight).await;

    let report = DemoReport {
        strategy: limiter.strategy(),
        admitted: config.requests,
        denied,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        admitted = report.admitted,
        denied = report.denied,
        "Sequential run complete"
    );
    report
}

/// Fire `bursts` rounds of `requests` concurrent admission checks.
///
/// Rounds start `burst_pause_ms` apart without waiting for the previous
/// round; denied requests are dropped.
pub async fn run_bursts<L>(limiter: Arc<L>, config: &DemoConfig) -> DemoReport
where
    L: Limiter + ?Sized + 'static,
{
    let started = Instant::now();
    let pause = Duration::from_millis(config.burst_pause_ms);
    let work = Duration::from_millis(config.work_ms);

    let mut handles = Vec::new();
    for burst in 0..config.bursts {
        if burst > 0 {
            sleep(pause).await;
        }

        debug!(burst = burst, requests = config.requests, "Starting burst");
        for offset in 0..config.requests {
            let request_id = burst * config.requests + offset + 1;
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let admitted = limiter.try_admit(request_id);
                if admitted {
                    info!(request_id = request_id, "Request admitted");
                    sleep(work).await;
                } else {
                    info!(request_id = request_id, "Request denied");
                }
                admitted
            }));
        }
    }

    let outcomes = join_logged(handles).await;
    let admitted = outcomes.iter().filter(|admitted| **admitted).count() as u64;
    let denied = outcomes.len() as u64 - admitted;

    let report = DemoReport {
        strategy: limiter.strategy(),
        admitted,
        denied,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        admitted = report.admitted,
        denied = report.denied,
        "Burst run complete"
    );
    report
}

/// Wait for spawned tasks and return the outputs of those that finished.
///
/// Tasks that panicked or were cancelled are logged and left out.
async fn join_logged<T>(handles: Vec<JoinHandle<T>>) -> Vec<T> {
    join_all(handles)
        .await
        .into_iter()
        .filter_map(|outcome| match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Demo task failed");
                None
            }
        })
        .collect()
}
