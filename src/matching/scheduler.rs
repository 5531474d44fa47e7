//! Scan scheduler: one pass at startup, then one per interval, never two at
//! once.
//!
//! The scheduler is `Idle` or `Running`. A trigger that arrives while a pass
//! is running is skipped, not queued. Missed interval ticks are dropped so
//! the cadence resumes from the next tick after an overrunning pass.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::pipeline::{PassError, PassSummary, Pipeline};
use crate::config::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(PassSummary),
    Aborted(PassError),
    /// A pass was already running.
    Skipped,
}

/// Resets the running flag when a pass ends, including when it is cancelled.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Run one pass unless one is already in flight.
    pub async fn trigger(&self) -> TriggerOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("scan pass still running, skipping trigger");
            return TriggerOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        match self.pipeline.run_pass().await {
            Ok(summary) => TriggerOutcome::Completed(summary),
            Err(e) => {
                error!(error = %e, "scan pass aborted, retrying next tick");
                TriggerOutcome::Aborted(e)
            }
        }
    }

    /// Drive passes on the configured interval until `shutdown` resolves.
    ///
    /// A pass in flight when `shutdown` resolves is abandoned; every match it
    /// already recorded stays recorded.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if !self.config.enabled {
            info!("scan scheduler disabled by configuration");
            return;
        }

        info!(
            interval_secs = self.config.interval_secs,
            run_on_start = self.config.run_on_start,
            "scan scheduler started"
        );

        let mut timer = interval(self.config.interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if !self.config.run_on_start {
            // The first tick completes immediately.
            timer.tick().await;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            warn!("shutdown requested mid-pass, abandoning current pass");
                            break;
                        }
                        outcome = self.trigger() => {
                            if let TriggerOutcome::Completed(summary) = outcome {
                                debug!(created = summary.matches_created, "tick complete");
                            }
                        }
                    }
                }
            }
        }

        info!("scan scheduler stopped");
    }
}
