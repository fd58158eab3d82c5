//! Cycle driver. One cycle at a time, whatever the trigger: ticks that
//! land while a cycle is still running are skipped, not queued, and the
//! manual trigger shares the same guard. Cycles run in their own task so
//! a panic is absorbed and reported instead of killing the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::pipeline::{CycleReport, Pipeline};
use crate::store::SeenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

/// Observable scheduler state, shared with the ops API.
#[derive(Default)]
pub struct SchedulerState {
    running: AtomicBool,
    skipped_ticks: AtomicU64,
    last_started: Mutex<Option<DateTime<Utc>>>,
    last_success: Mutex<Option<DateTime<Utc>>>,
    last_report: Mutex<Option<CycleReport>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub skipped_ticks: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
}

impl SchedulerState {
    /// Claim the running flag. False means a cycle is already in flight.
    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self, report: Option<CycleReport>) {
        if let Some(report) = report {
            *self.last_success.lock().expect("scheduler mutex poisoned") = Some(Utc::now());
            *self.last_report.lock().expect("scheduler mutex poisoned") = Some(report);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            skipped_ticks: self.skipped_ticks.load(Ordering::SeqCst),
            last_started: *self.last_started.lock().expect("scheduler mutex poisoned"),
            last_success: *self.last_success.lock().expect("scheduler mutex poisoned"),
            last_report: self
                .last_report
                .lock()
                .expect("scheduler mutex poisoned")
                .clone(),
        }
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    state: Arc<SchedulerState>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            state: Arc::new(SchedulerState::default()),
            interval,
        })
    }

    pub fn state(&self) -> Arc<SchedulerState> {
        Arc::clone(&self.state)
    }

    /// Start one cycle in the background if none is in flight. Used by both
    /// the tick loop and the manual-trigger endpoint.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        if !self.state.try_begin() {
            self.state.skipped_ticks.fetch_add(1, Ordering::SeqCst);
            counter!("relay_cycles_skipped_total").increment(1);
            return TriggerOutcome::AlreadyRunning;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_cycle_guarded().await;
        });
        TriggerOutcome::Started
    }

    /// Runs with the flag already claimed; always releases it.
    async fn run_cycle_guarded(&self) {
        *self
            .state
            .last_started
            .lock()
            .expect("scheduler mutex poisoned") = Some(Utc::now());

        let pipeline = Arc::clone(&self.pipeline);
        let outcome = tokio::spawn(async move { pipeline.run_cycle().await }).await;

        match outcome {
            Ok(Ok(report)) => {
                self.state.finish(Some(report));
            }
            Ok(Err(e)) => {
                error!(error = %e, "cycle failed");
                counter!("relay_cycles_failed_total").increment(1);
                self.state.finish(None);
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(error = %join_err, "cycle panicked");
                } else {
                    warn!(error = %join_err, "cycle task cancelled");
                }
                counter!("relay_cycles_failed_total").increment(1);
                self.state.finish(None);
            }
        }
    }

    /// Spawn the tick loop. The first tick fires immediately, so a fresh
    /// deployment posts news without waiting a whole interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_s = self.interval.as_secs(), "scheduler started");
            loop {
                ticker.tick().await;
                match self.trigger() {
                    TriggerOutcome::Started => {}
                    TriggerOutcome::AlreadyRunning => {
                        debug!("tick skipped, previous cycle still running");
                    }
                }
            }
        })
    }
}

/// Daily retention job for the seen store. Also runs once at startup.
pub fn spawn_cleanup(store: Arc<dyn SeenStore>, retention_days: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 3600));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
            match store.cleanup(cutoff).await {
                Ok(removed) => {
                    if removed > 0 {
                        counter!("relay_cleanup_removed_total").increment(removed);
                    }
                    info!(removed, retention_days, "seen store cleanup finished");
                }
                Err(e) => warn!(error = %e, "seen store cleanup failed"),
            }
        }
    })
}
