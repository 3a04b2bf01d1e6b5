//! Tick scheduler with overlap prevention.
//!
//! Cycles start on a fixed tick-start-to-tick-start period. The first tick
//! fires immediately. A tick that arrives while a cycle is still running is
//! logged and dropped, never queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default period between cycle starts.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Holds the scheduler in `Running`; dropping it returns to `Idle`.
#[derive(Debug)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Tick counters for status reporting and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub started: u64,
    pub skipped: u64,
}

pub struct TickScheduler {
    interval: Duration,
    running: Arc<AtomicBool>,
    started: AtomicU64,
    skipped: AtomicU64,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            started: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn stats(&self) -> TickStats {
        TickStats {
            started: self.started.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }

    /// Move `Idle -> Running`, or return `None` if a cycle is already running.
    pub fn try_begin(&self) -> Option<CycleGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard {
                running: Arc::clone(&self.running),
            })
    }

    /// Handle one tick: start `cycle` on a task unless one is running.
    fn on_tick<F, Fut>(&self, cycle: &F) -> Option<tokio::task::JoinHandle<()>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.try_begin() {
            Some(guard) => {
                self.started.fetch_add(1, Ordering::SeqCst);
                let fut = cycle();
                Some(tokio::spawn(async move {
                    let _guard = guard;
                    fut.await;
                }))
            }
            None => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                warn!("Previous cycle still running, skipping tick");
                None
            }
        }
    }

    /// Run `cycle` on every tick until `shutdown` flips to `true` or its
    /// sender is dropped, then wait for the in-flight cycle to finish.
    pub async fn run<F, Fut>(&self, cycle: F, mut shutdown: watch::Receiver<bool>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<tokio::task::JoinHandle<()>> = None;

        info!(interval_secs = self.interval.as_secs_f64(), "Tick scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(handle) = self.on_tick(&cycle) {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        debug!("Tick scheduler stopping");
        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                error!(error = %e, "Cycle task failed");
            }
        }

        info!(
            started = self.stats().started,
            skipped = self.stats().skipped,
            "Tick scheduler stopped"
        );
    }
}
