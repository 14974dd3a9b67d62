// src/engine/supervisor.rs

//! Periodic supervision of the tracking table.
//!
//! A supervisor tick runs, in order:
//! 1. timeout detection: cancel overdue jobs and persist FAILURE;
//! 2. terminal reconciliation: force FAILURE on completed jobs whose
//!    persisted status is still non-terminal, then sweep them;
//! 3. a tracked-jobs gauge.
//!
//! Heartbeats run on their own interval. Store failures inside a tick are
//! logged and the next tick runs regardless.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::core::EtlEngine;
use super::panic_message;
use crate::errors::{EtlError, Result};
use crate::job::{JobId, JobStateFilter, JobStateUpdate, JobStatus};
use crate::telemetry::names;

/// What one supervisor pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorTick {
    pub timed_out: usize,
    pub forced_failures: usize,
    pub swept: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Sweep {
    forced_failures: usize,
    swept: usize,
}

impl EtlEngine {
    /// One supervisor pass.
    pub async fn monitor_worker_threads(&self) -> SupervisorTick {
        let timed_out = self.detect_timed_out_jobs().await;
        let sweep = self.ensure_done_jobs_marked_as_terminated().await;

        let tracked = self.jobs.len();
        self.telemetry.gauge(names::TRACKED_JOBS, tracked as f64);

        let tick = SupervisorTick {
            timed_out,
            forced_failures: sweep.forced_failures,
            swept: sweep.swept,
        };
        debug!(tracked, ?tick, "supervisor tick complete");
        tick
    }

    /// Cancel running jobs past their timeout and persist FAILURE for them.
    ///
    /// A failed write is retried on the next tick; the entry stays tracked.
    async fn detect_timed_out_jobs(&self) -> usize {
        let overdue: Vec<(JobId, Duration, Duration)> = self
            .jobs
            .iter_mut()
            .filter_map(|mut job| {
                if job.timeout_recorded || job.is_finished() {
                    return None;
                }
                let elapsed = job.started.elapsed();
                let timeout = job.descriptor.timeout;
                if elapsed <= timeout {
                    return None;
                }
                job.cancel.cancel();
                job.timed_out = true;
                Some((*job.key(), elapsed, timeout))
            })
            .collect();

        for (id, elapsed, timeout) in &overdue {
            warn!(
                job = %id,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "job timed out; cancelling"
            );
            match self
                .store
                .update(*id, JobStateUpdate::status(JobStatus::Failure))
                .await
            {
                Ok(recorded) => {
                    if !recorded {
                        warn!(job = %id, "no job state record for timed-out job");
                    }
                    if let Some(mut job) = self.jobs.get_mut(id) {
                        job.timeout_recorded = true;
                    }
                }
                Err(e) => {
                    error!(job = %id, error = %e, "failed to record FAILURE for timed-out job");
                }
            }
        }

        overdue.len()
    }

    /// Reconcile completed jobs against their persisted status and sweep them.
    ///
    /// Entries are removed even when the status lookup fails.
    pub(crate) async fn ensure_done_jobs_marked_as_terminated(&self) -> Sweep {
        let done: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|job| job.is_finished())
            .map(|job| *job.key())
            .collect();
        if done.is_empty() {
            return Sweep::default();
        }

        let mut sweep = Sweep::default();
        match self.store.stream(JobStateFilter::ids(done.iter().copied())).await {
            Ok(states) => {
                for state in states.into_iter().filter(|s| !s.status.is_terminal()) {
                    warn!(
                        job = %state.id,
                        status = state.status.as_str(),
                        "completed job left non-terminal status; forcing FAILURE"
                    );
                    let update = JobStateUpdate::status(JobStatus::Failure).when_status(state.status);
                    match self.store.update(state.id, update).await {
                        Ok(true) => sweep.forced_failures += 1,
                        Ok(false) => debug!(job = %state.id, "status changed concurrently; not forced"),
                        Err(e) => error!(job = %state.id, error = %e, "failed to force FAILURE status"),
                    }
                }
            }
            Err(e) => {
                error!(jobs = done.len(), error = %e, "failed to load job states for completed jobs");
            }
        }

        for id in &done {
            if self.jobs.remove_if(id, |_, job| job.is_finished()).is_some() {
                sweep.swept += 1;
            }
        }
        if sweep.swept > 0 {
            info!(swept = sweep.swept, forced = sweep.forced_failures, "swept completed jobs");
        }
        sweep
    }

    /// Write a heartbeat for every tracked job that is still running.
    ///
    /// Every write is attempted; if any fails, the first error is returned.
    pub async fn record_heartbeat_for_all_threads(&self) -> Result<usize> {
        let running: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|job| !job.is_finished())
            .map(|job| *job.key())
            .collect();

        let now = Utc::now();
        let mut written = 0;
        let mut failures = Vec::new();
        for id in running {
            match self.store.update(id, JobStateUpdate::heartbeat(now)).await {
                Ok(_) => written += 1,
                Err(e) => failures.push((id, e)),
            }
        }

        if let Some((id, first)) = failures.first() {
            return Err(EtlError::store(format!(
                "{} heartbeat write(s) failed; first for job {id}: {first}",
                failures.len()
            )));
        }
        debug!(written, "heartbeats recorded");
        Ok(written)
    }

    /// Start the supervisor and heartbeat loops on the engine's runtime.
    pub fn spawn_supervisor(self: &Arc<Self>) -> SupervisorHandle {
        let shutdown = CancellationToken::new();

        let monitor = {
            let engine = Arc::clone(self);
            let shutdown = shutdown.clone();
            self.runtime.spawn(async move {
                let mut ticker = tokio::time::interval(engine.config.supervisor_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(
                    period_ms = engine.config.supervisor_interval.as_millis() as u64,
                    "supervisor loop started"
                );
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if let Err(panic) = AssertUnwindSafe(engine.monitor_worker_threads())
                        .catch_unwind()
                        .await
                    {
                        error!(panic = %panic_message(panic.as_ref()), "supervisor tick panicked");
                    }
                }
                info!("supervisor loop stopped");
            })
        };

        let heartbeat = {
            let engine = Arc::clone(self);
            let shutdown = shutdown.clone();
            self.runtime.spawn(async move {
                let mut ticker = tokio::time::interval(engine.config.heartbeat_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    match AssertUnwindSafe(engine.record_heartbeat_for_all_threads())
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "heartbeat pass failed"),
                        Err(panic) => {
                            error!(panic = %panic_message(panic.as_ref()), "heartbeat pass panicked")
                        }
                    }
                }
                info!("heartbeat loop stopped");
            })
        };

        SupervisorHandle {
            shutdown,
            tasks: vec![monitor, heartbeat],
        }
    }
}

/// Running supervisor and heartbeat loops.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Stop both loops and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "supervisor loop ended abnormally");
            }
        }
    }
}
