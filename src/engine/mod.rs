// src/engine/mod.rs

//! Job execution engine.
//!
//! This module ties together:
//! - admission control and dispatch ([`EtlEngine::submit_job`])
//! - the per-job execution unit (`runnable`)
//! - periodic supervision: timeout detection, terminal-state reconciliation
//!   and heartbeats (`supervisor`)
//!
//! Per tracked job the engine moves through
//! `Submitted -> Running -> {CompletedOk, CompletedError, TimedOut}`; every
//! right-hand state is swept from the tracking table by the next supervisor
//! pass.

pub mod core;
mod runnable;
pub mod supervisor;

use std::any::Any;
use std::time::Duration;

use tokio::sync::watch;

use crate::job::JobId;

pub use self::core::{EtlEngine, EtlEngineBuilder};
pub use supervisor::{SupervisorHandle, SupervisorTick};

/// Tunables of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of the worker pool; also the admission limit.
    pub worker_threads: usize,
    pub supervisor_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Above this many tracked entries, admission sweeps completed jobs
    /// before evaluating capacity.
    pub retention_ceiling: usize,
}

impl EngineConfig {
    pub fn new(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            retention_ceiling: worker_threads.saturating_mul(10),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            supervisor_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            retention_ceiling: 40,
        }
    }
}

/// Why a submission was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Every worker slot is taken by a running job.
    AtCapacity,
    /// A job with the same identity is already tracked.
    DuplicateJob,
    /// No processor is registered under this name.
    UnsupportedProcessor(String),
    /// The worker pool refused the task.
    PoolSaturated,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::AtCapacity => "at_capacity",
            RejectReason::DuplicateJob => "duplicate_job",
            RejectReason::UnsupportedProcessor(_) => "unsupported_processor",
            RejectReason::PoolSaturated => "pool_saturated",
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Dispatched(JobHandle),
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, SubmitOutcome::Dispatched(_))
    }

    pub fn handle(self) -> Option<JobHandle> {
        match self {
            SubmitOutcome::Dispatched(handle) => Some(handle),
            SubmitOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            SubmitOutcome::Dispatched(_) => None,
            SubmitOutcome::Rejected(reason) => Some(reason),
        }
    }
}

/// How one runnable ended, as observed locally.
///
/// Advisory only: the persisted job status is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
    Panicked(String),
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "success",
            RunOutcome::Failed(_) => "failure",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Panicked(_) => "panicked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub id: JobId,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
    pub entities: u64,
}

/// Progress of a runnable, published over a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnableState {
    Submitted,
    Running,
    Finished(RunReport),
}

/// Engine-level phase of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Submitted,
    Running,
    CompletedOk,
    CompletedError,
    TimedOut,
}

/// Caller-side view of a dispatched job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    state: watch::Receiver<RunnableState>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, state: watch::Receiver<RunnableState>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> RunnableState {
        self.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.state.borrow(), RunnableState::Finished(_))
    }

    /// Wait for the runnable to finish.
    ///
    /// Returns `None` if the task went away without reporting.
    pub async fn wait(mut self) -> Option<RunReport> {
        let state = self
            .state
            .wait_for(|s| matches!(s, RunnableState::Finished(_)))
            .await
            .ok()?;
        let report = match &*state {
            RunnableState::Finished(report) => Some(report.clone()),
            _ => None,
        };
        report
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
