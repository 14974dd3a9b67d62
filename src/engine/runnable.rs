// src/engine/runnable.rs

//! Execution unit for one job attempt.
//!
//! Nothing that happens inside a job escapes this module: errors and panics
//! are turned into a [`RunOutcome`], logged, timed and published on the
//! job's watch channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{RunOutcome, RunReport, RunnableState, panic_message};
use crate::errors::{EtlError, Result};
use crate::job::{JobDescriptor, JobStateUpdate, JobStatus};
use crate::objects::ObjectStore;
use crate::pipeline::{JobContext, PipelineReport};
use crate::registry::DynProcessor;
use crate::rehydrate::PayloadRehydrator;
use crate::store::JobStateStore;
use crate::telemetry::{TelemetrySink, names};

pub(crate) struct JobRunnable {
    pub(crate) descriptor: Arc<JobDescriptor>,
    pub(crate) processor: Arc<dyn DynProcessor>,
    pub(crate) store: Arc<dyn JobStateStore>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) rehydrator: PayloadRehydrator,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: watch::Sender<RunnableState>,
}

impl JobRunnable {
    pub(crate) async fn run(self) {
        let id = self.descriptor.id;
        let started = Instant::now();
        self.state.send_replace(RunnableState::Running);

        let work = AssertUnwindSafe(self.execute()).catch_unwind();
        let (outcome, entities) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => (RunOutcome::Cancelled, 0),
            result = work => match result {
                Ok(Ok(report)) => (RunOutcome::Succeeded, report.entities_processed()),
                Ok(Err(EtlError::Cancelled(_))) => (RunOutcome::Cancelled, 0),
                Ok(Err(err)) => (RunOutcome::Failed(format!("{err:#}")), 0),
                Err(panic) => (RunOutcome::Panicked(panic_message(panic.as_ref())), 0),
            },
        };
        let elapsed = started.elapsed();

        let processor = self.descriptor.processor.as_str();
        let elapsed_ms = elapsed.as_millis() as u64;
        match &outcome {
            RunOutcome::Succeeded => {
                info!(job = %id, processor, elapsed_ms, entities, "job finished")
            }
            RunOutcome::Failed(reason) => {
                warn!(job = %id, processor, elapsed_ms, error = %reason, "job ran with exception")
            }
            RunOutcome::Cancelled => {
                warn!(job = %id, processor, elapsed_ms, "job cancelled")
            }
            RunOutcome::Panicked(reason) => {
                error!(job = %id, processor, elapsed_ms, panic = %reason, "job panicked")
            }
        }
        self.telemetry
            .timing(names::JOB_DURATION_SECONDS, processor, outcome.as_str(), elapsed);

        self.state.send_replace(RunnableState::Finished(RunReport {
            id,
            outcome,
            elapsed,
            entities,
        }));
    }

    async fn execute(&self) -> Result<PipelineReport> {
        let id = self.descriptor.id;
        let state = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EtlError::store(format!("no job state record for {id}")))?;

        let now = Utc::now();
        let start = JobStateUpdate {
            status: Some(JobStatus::Running),
            started_at: Some(now),
            heartbeat: Some(now),
            increment_attempt: true,
            ..Default::default()
        };
        self.store.update(id, start).await?;

        let mut ctx = JobContext::new(self.descriptor.clone(), self.objects.clone(), self.cancel.clone())
            .with_checkpoints(state.progress.clone());

        if self.processor.job_kind().requires_payload() {
            match self.rehydrator.rehydrate(&self.descriptor, &state).await {
                Ok(payload) => ctx = ctx.with_payload(payload),
                Err(err) => {
                    let update =
                        JobStateUpdate::status(JobStatus::Failure).when_status(JobStatus::Running);
                    if let Err(persist_err) = self.store.update(id, update).await {
                        warn!(job = %id, error = %persist_err, "failed to record FAILURE status");
                    }
                    return Err(err);
                }
            }
        }

        self.processor.execute(&ctx, self.store.as_ref()).await
    }
}
