use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::core::config::WorkerSettings;
use crate::tasks::worker::WorkerLoop;

/// Process-wide worker counters, surfaced by `GET /ready`. The only global
/// mutable state in the process, hence atomics.
#[derive(Debug, Default)]
pub(crate) struct WorkerRuntimeState {
    started: AtomicBool,
    stopped: AtomicBool,
    ticks_total: AtomicU64,
    claims_total: AtomicU64,
    idle_ticks_total: AtomicU64,
    errors_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerMetricsSnapshot {
    pub(crate) started: bool,
    pub(crate) stopped: bool,
    pub(crate) ticks_total: u64,
    pub(crate) claims_total: u64,
    pub(crate) idle_ticks_total: u64,
    pub(crate) errors_total: u64,
}

impl WorkerRuntimeState {
    pub(crate) fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            claims_total: self.claims_total.load(Ordering::Relaxed),
            idle_ticks_total: self.idle_ticks_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
        }
    }
}

/// Drive one worker loop until shutdown: tick, then sleep by outcome
/// (worked / idle / errored).
pub(crate) async fn run(
    worker_loop: WorkerLoop,
    settings: WorkerSettings,
    state: Arc<WorkerRuntimeState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stage = worker_loop.stage();
    state.started.store(true, Ordering::Relaxed);
    tracing::info!(stage = %stage, "worker loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        state.ticks_total.fetch_add(1, Ordering::Relaxed);
        let delay_ms = match worker_loop.run_once(shutdown.clone()).await {
            Ok(true) => {
                state.claims_total.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("worker_ticks_total", "stage" => stage.as_str(), "result" => "worked")
                    .increment(1);
                settings.poll_interval_ms
            }
            Ok(false) => {
                state.idle_ticks_total.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("worker_ticks_total", "stage" => stage.as_str(), "result" => "idle")
                    .increment(1);
                settings.idle_backoff_ms
            }
            Err(err) => {
                state.errors_total.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("worker_ticks_total", "stage" => stage.as_str(), "result" => "error")
                    .increment(1);
                tracing::error!(stage = %stage, error = %format!("{err:#}"), "worker tick error");
                settings.error_backoff_ms
            }
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }
    }

    state.stopped.store(true, Ordering::Relaxed);
    tracing::info!(stage = %stage, "worker loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_updates() {
        let state = WorkerRuntimeState::default();
        state.started.store(true, Ordering::Relaxed);
        state.ticks_total.fetch_add(3, Ordering::Relaxed);
        state.claims_total.fetch_add(1, Ordering::Relaxed);
        state.idle_ticks_total.fetch_add(2, Ordering::Relaxed);

        let snapshot = state.snapshot();
        assert!(snapshot.started);
        assert!(!snapshot.stopped);
        assert_eq!(snapshot.ticks_total, 3);
        assert_eq!(snapshot.claims_total, 1);
        assert_eq!(snapshot.idle_ticks_total, 2);
        assert_eq!(snapshot.errors_total, 0);
    }
}
