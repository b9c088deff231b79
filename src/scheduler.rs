//! Long-running refresh loop with per-cycle fault containment.
//!
//! The scheduler is a two-state machine, `Running` and `Stopped`. A stop request
//! is honoured at the next cycle boundary: the sleep between cycles ends
//! early, but a cycle already in progress runs to completion.
//!
//! Every cycle runs in its own Tokio task. Whether it returns an error or
//! panics, the outcome is logged and counted and the loop sleeps and tries
//! again.

use crate::metric_names::{CYCLE_DURATION, CYCLES_FAILED};
use crate::{GridReport, RefreshError, RefreshPipeline, SyncReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// `None` when the synchronization phase failed; the sweep still ran.
    pub sync: Option<SyncReport>,
    pub grid: GridReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

pub struct RefreshScheduler {
    pipeline: Arc<RefreshPipeline>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(pipeline: Arc<RefreshPipeline>, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    /// Run exactly one contained cycle.
    pub async fn run_once(&self) -> Result<CycleReport, RefreshError> {
        run_cycle(Arc::clone(&self.pipeline), 1).await
    }

    /// Start the loop on the current runtime.
    ///
    /// Dropping the returned handle requests a stop, as does [`SchedulerHandle::stop`].
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_loop(self, stop_rx, Arc::clone(&running)));
        SchedulerHandle {
            stop: stop_tx,
            running,
            task,
        }
    }
}

/// Control handle for a spawned scheduler.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to stop at the next cycle boundary.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Wait for the loop to exit. Does not request a stop by itself.
    pub async fn join(self) -> Result<(), RefreshError> {
        let SchedulerHandle { stop, task, .. } = self;
        let outcome = task.await;
        drop(stop);
        outcome.map_err(RefreshError::from)
    }
}

async fn run_loop(
    scheduler: RefreshScheduler,
    mut stop: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) {
    tracing::info!(interval_secs = scheduler.interval.as_secs(), "scheduler_started");
    let mut cycle: u64 = 0;

    while !*stop.borrow() {
        cycle += 1;
        // Outcome is logged and counted inside; the loop only cares that it returned.
        let _ = run_cycle(Arc::clone(&scheduler.pipeline), cycle).await;

        tokio::select! {
            _ = tokio::time::sleep(scheduler.interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    running.store(false, Ordering::Release);
    tracing::info!(cycles = cycle, "scheduler_stopped");
}

async fn run_cycle(
    pipeline: Arc<RefreshPipeline>,
    cycle: u64,
) -> Result<CycleReport, RefreshError> {
    let started = Instant::now();
    let span = tracing::info_span!("refresh.cycle", cycle);
    let outcome = tokio::spawn(async move { pipeline.run_cycle().await }.instrument(span)).await;
    let elapsed = started.elapsed();
    metrics::histogram!(CYCLE_DURATION).record(elapsed.as_secs_f64());

    match outcome {
        Ok(Ok(report)) => {
            tracing::info!(
                cycle,
                synced = report.sync.map(|s| s.synced),
                errors = report.sync.map(|s| s.errors),
                cells_refreshed = report.grid.cells_refreshed,
                cells_failed = report.grid.cells_failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "refresh_cycle_complete"
            );
            Ok(report)
        }
        Ok(Err(err)) => {
            metrics::counter!(CYCLES_FAILED).increment(1);
            tracing::error!(
                cycle,
                error = %err,
                elapsed_ms = elapsed.as_millis() as u64,
                "refresh_cycle_failure"
            );
            Err(err)
        }
        Err(join_err) => {
            metrics::counter!(CYCLES_FAILED).increment(1);
            tracing::error!(cycle, error = %join_err, "refresh_cycle_panic");
            Err(RefreshError::from(join_err))
        }
    }
}
