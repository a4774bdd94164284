//! Periodic batch scheduling with optional cross-instance exclusion
//!
//! The scheduler owns one long-lived loop task. Each tick it (optionally)
//! takes the distributed lock, runs one batch while a side task keeps the lock
//! alive, then releases the lock so any instance may take the next cycle.
//!
//! ```text
//!            start()                 stop()
//! Stopped ──────────> Starting ──> Running ──────> Stopping ──> Stopped
//!    ^                                                             │
//!    └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The final `Stopping -> Stopped` step is taken by the loop task itself as
//! it exits.

use std::{sync::Arc, time::Duration};

use courier_common::{internal, tracing};
use courier_lock::DistributedLock;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};

use crate::{
    error::DeliveryError,
    processor::{BatchOutcome, BatchProcessor},
};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Externally visible scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug)]
struct RunningLoop {
    shutdown: watch::Sender<bool>,
    /// Closed when the loop task ends
    finished: watch::Receiver<()>,
}

#[derive(Debug)]
enum SchedulerState {
    Stopped,
    Starting,
    Running(RunningLoop),
    Stopping(RunningLoop),
}

impl SchedulerState {
    const fn status(&self) -> SchedulerStatus {
        match self {
            Self::Stopped => SchedulerStatus::Stopped,
            Self::Starting => SchedulerStatus::Starting,
            Self::Running(_) => SchedulerStatus::Running,
            Self::Stopping(_) => SchedulerStatus::Stopping,
        }
    }
}

/// Everything one delivery cycle needs, shared by the loop and `process_once`
#[derive(Debug)]
struct Dispatch {
    processor: Arc<BatchProcessor>,
    lock: Option<Arc<DistributedLock>>,
    interval: Duration,
    /// Serialises cycles within this process
    cycle: tokio::sync::Mutex<()>,
}

impl Dispatch {
    async fn run_cycle(&self) -> Result<BatchOutcome, DeliveryError> {
        let _cycle = self.cycle.lock().await;

        let Some(lock) = &self.lock else {
            return self.processor.process_batch().await;
        };

        // A handle that still believes it holds the lock re-checks through the store
        lock.acquire().await?;

        let extender = spawn_extender(Arc::clone(lock), self.extend_period());
        let result = self.processor.process_batch().await;
        extender.abort();

        if let Err(e) = lock.release().await {
            tracing::debug!(key = %lock.key(), error = %e, "Lock not released after batch");
        }

        result
    }

    fn extend_period(&self) -> Duration {
        (self.interval / 2).max(MIN_PERIOD)
    }
}

/// Keep the lock alive while a batch runs
///
/// Stops at the first failed extension; the handle has already marked itself
/// not-held by then and the batch is left to finish.
fn spawn_extender(lock: Arc<DistributedLock>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Err(e) = lock.extend().await {
                tracing::warn!(
                    key = %lock.key(),
                    error = %e,
                    "Lost the lock mid-batch, finishing the batch anyway"
                );
                break;
            }
        }
    })
}

async fn next_extend_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_cycle(result: &Result<BatchOutcome, DeliveryError>) {
    match result {
        Ok(outcome) if outcome.claimed == 0 => {}
        Ok(outcome) if outcome.is_success() => {
            tracing::info!(delivered = outcome.delivered, "Batch complete");
        }
        Ok(outcome) => {
            tracing::warn!(
                delivered = outcome.delivered,
                failed = outcome.failed,
                "Batch partially failed"
            );
        }
        Err(e) if e.is_lock_contended() => {
            tracing::debug!("Another instance holds the lock, skipping cycle");
        }
        Err(e) => {
            tracing::error!(error = %e, "Delivery cycle failed");
        }
    }
}

async fn run_loop(dispatch: Arc<Dispatch>, mut shutdown: watch::Receiver<bool>) {
    internal!(level = INFO, "Delivery loop started");

    let mut process_ticker = tokio::time::interval(dispatch.interval.max(MIN_PERIOD));
    process_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut extend_ticker = dispatch.lock.as_ref().map(|_| {
        let period = dispatch.extend_period();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                internal!("Delivery loop received shutdown signal");
                break;
            }
            _ = process_ticker.tick() => {
                let result = dispatch.run_cycle().await;
                log_cycle(&result);
            }
            () = next_extend_tick(extend_ticker.as_mut()) => {
                // Only relevant if a post-batch release failed and we still hold it
                if let Some(lock) = &dispatch.lock
                    && lock.is_held()
                    && let Err(e) = lock.extend().await
                {
                    tracing::warn!(key = %lock.key(), error = %e, "Failed to extend lock");
                }
            }
        }
    }

    if let Some(lock) = &dispatch.lock
        && lock.is_held()
        && let Err(e) = lock.release().await
    {
        tracing::warn!(key = %lock.key(), error = %e, "Failed to release lock on shutdown");
    }

    internal!(level = INFO, "Delivery loop stopped");
}

/// Returns the scheduler to `Stopped` when the loop task ends
///
/// Owned by the task, so it also fires if the task panics or is dropped with
/// the runtime. Only one loop task exists at a time, so the state it resets is
/// always its own.
struct LoopExit {
    state: Arc<Mutex<SchedulerState>>,
    _finished: watch::Sender<()>,
}

impl Drop for LoopExit {
    fn drop(&mut self) {
        *self.state.lock() = SchedulerState::Stopped;
    }
}

/// Drives [`BatchProcessor`] on a fixed interval
#[derive(Debug)]
pub struct Scheduler {
    dispatch: Arc<Dispatch>,
    state: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    /// Build a stopped scheduler
    ///
    /// With `lock` set, a cycle only runs while this instance holds the lock.
    pub fn new(
        processor: Arc<BatchProcessor>,
        lock: Option<Arc<DistributedLock>>,
        interval: Duration,
    ) -> Self {
        Self {
            dispatch: Arc::new(Dispatch {
                processor,
                lock,
                interval,
                cycle: tokio::sync::Mutex::new(()),
            }),
            state: Arc::new(Mutex::new(SchedulerState::Stopped)),
        }
    }

    /// Start the loop; a no-op unless stopped
    ///
    /// The first batch runs immediately. Must be called within a Tokio
    /// runtime.
    ///
    /// Returns `true` if this call started the loop.
    pub fn start(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SchedulerState::Stopped) {
                return false;
            }
            *state = SchedulerState::Starting;
        }

        let (shutdown, receiver) = watch::channel(false);
        let (finished_sender, finished) = watch::channel(());
        let exit = LoopExit {
            state: Arc::clone(&self.state),
            _finished: finished_sender,
        };
        let dispatch = Arc::clone(&self.dispatch);
        tokio::spawn(async move {
            let _exit = exit;
            run_loop(dispatch, receiver).await;
        });

        {
            let mut state = self.state.lock();
            // The task may already have ended and reset the state
            if !matches!(*state, SchedulerState::Starting) {
                return false;
            }
            *state = SchedulerState::Running(RunningLoop { shutdown, finished });
        }
        internal!(level = INFO, interval = ?self.dispatch.interval, "Scheduler started");
        true
    }

    /// Stop the loop and wait for it to exit; a no-op unless running
    ///
    /// Any in-flight batch finishes first, bounded by the processing timeout.
    /// Dropping the returned future does not cancel the shutdown: the loop
    /// still exits and the scheduler still reaches `Stopped`.
    ///
    /// Returns `true` if this call stopped the loop.
    pub async fn stop(&self) -> bool {
        let mut finished = loop {
            {
                let mut state = self.state.lock();
                match std::mem::replace(&mut *state, SchedulerState::Stopped) {
                    SchedulerState::Running(running) => {
                        let _ = running.shutdown.send(true);
                        let finished = running.finished.clone();
                        *state = SchedulerState::Stopping(running);
                        break finished;
                    }
                    SchedulerState::Starting => *state = SchedulerState::Starting,
                    other => {
                        *state = other;
                        return false;
                    }
                }
            }

            // A concurrent start is between spawning and publishing the loop
            tokio::task::yield_now().await;
        };

        internal!(level = INFO, "Scheduler stopping");
        // Nothing is ever sent; this resolves once the loop task has ended
        let _ = finished.changed().await;
        internal!(level = INFO, "Scheduler stopped");
        true
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), SchedulerState::Running(_))
    }

    pub fn status(&self) -> SchedulerStatus {
        self.state.lock().status()
    }

    /// Run one cycle now, outside the schedule
    ///
    /// Honours the lock exactly like a scheduled cycle and never overlaps one.
    ///
    /// # Errors
    /// [`DeliveryError::Lock`] if the lock cannot be taken, or any batch error
    pub async fn process_once(&self) -> Result<BatchOutcome, DeliveryError> {
        let result = self.dispatch.run_cycle().await;
        log_cycle(&result);
        result
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        &self.dispatch.processor
    }

    pub fn interval(&self) -> Duration {
        self.dispatch.interval
    }

    pub fn lock(&self) -> Option<&Arc<DistributedLock>> {
        self.dispatch.lock.as_ref()
    }
}
