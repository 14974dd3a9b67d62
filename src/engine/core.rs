// src/engine/core.rs

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::runnable::JobRunnable;
use super::{EngineConfig, JobHandle, JobPhase, RejectReason, RunOutcome, RunnableState, SubmitOutcome};
use crate::errors::{EtlError, Result};
use crate::ingestion::{IngestionResultSource, StaticIngestionResults};
use crate::job::{JobDescriptor, JobId};
use crate::objects::{InMemoryObjectStore, ObjectStore};
use crate::registry::ProcessorRegistry;
use crate::rehydrate::PayloadRehydrator;
use crate::store::JobStateStore;
use crate::telemetry::{NoopTelemetry, TelemetrySink};

/// One tracked job: descriptor, cancellable task and its stopwatch.
pub(crate) struct EngineJob {
    pub(crate) descriptor: Arc<JobDescriptor>,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
    pub(crate) started: Instant,
    pub(crate) state: watch::Receiver<RunnableState>,
    /// The supervisor cancelled this job for exceeding its timeout.
    pub(crate) timed_out: bool,
    /// The timeout FAILURE has been persisted.
    pub(crate) timeout_recorded: bool,
}

impl EngineJob {
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn phase(&self) -> JobPhase {
        if self.timed_out {
            return JobPhase::TimedOut;
        }
        match &*self.state.borrow() {
            RunnableState::Submitted => JobPhase::Submitted,
            RunnableState::Running if self.is_finished() => JobPhase::CompletedError,
            RunnableState::Running => JobPhase::Running,
            RunnableState::Finished(report) if report.outcome == RunOutcome::Succeeded => {
                JobPhase::CompletedOk
            }
            RunnableState::Finished(_) => JobPhase::CompletedError,
        }
    }
}

/// In-process job scheduler.
///
/// Owns the worker-pool permits and the tracking table; the table lives and
/// dies with the engine instance.
pub struct EtlEngine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<ProcessorRegistry>,
    pub(crate) store: Arc<dyn JobStateStore>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) rehydrator: PayloadRehydrator,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) jobs: DashMap<JobId, EngineJob>,
    permits: Arc<Semaphore>,
    pub(crate) runtime: Handle,
}

impl std::fmt::Debug for EtlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("tracked_jobs", &self.jobs.len())
            .finish()
    }
}

pub struct EtlEngineBuilder {
    config: EngineConfig,
    registry: ProcessorRegistry,
    store: Arc<dyn JobStateStore>,
    objects: Option<Arc<dyn ObjectStore>>,
    ingestion: Option<Arc<dyn IngestionResultSource>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    runtime: Option<Handle>,
}

impl EtlEngineBuilder {
    pub fn objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn ingestion(mut self, ingestion: Arc<dyn IngestionResultSource>) -> Self {
        self.ingestion = Some(ingestion);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Runtime that runnables and supervisor loops are spawned on.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<EtlEngine> {
        if self.config.worker_threads == 0 {
            return Err(EtlError::ConfigError(
                "worker_threads must be >= 1 (got 0)".to_string(),
            ));
        }
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                EtlError::ConfigError(format!("engine must be built inside a tokio runtime: {e}"))
            })?,
        };

        let objects = self
            .objects
            .unwrap_or_else(|| Arc::new(InMemoryObjectStore::new()));
        let ingestion = self
            .ingestion
            .unwrap_or_else(|| Arc::new(StaticIngestionResults::default()));
        let telemetry = self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry));
        let rehydrator = PayloadRehydrator::new(self.store.clone(), objects.clone(), ingestion);

        info!(
            worker_threads = self.config.worker_threads,
            retention_ceiling = self.config.retention_ceiling,
            processors = ?self.registry.names().collect::<Vec<_>>(),
            "etl engine constructed"
        );

        Ok(EtlEngine {
            permits: Arc::new(Semaphore::new(self.config.worker_threads)),
            config: self.config,
            registry: Arc::new(self.registry),
            store: self.store,
            objects,
            rehydrator,
            telemetry,
            jobs: DashMap::new(),
            runtime,
        })
    }
}

impl EtlEngine {
    pub fn builder(
        config: EngineConfig,
        registry: ProcessorRegistry,
        store: Arc<dyn JobStateStore>,
    ) -> EtlEngineBuilder {
        EtlEngineBuilder {
            config,
            registry,
            store,
            objects: None,
            ingestion: None,
            telemetry: None,
            runtime: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Submit a job for execution.
    ///
    /// Checks, in order: capacity, duplicate identity, processor name, pool
    /// permit. A rejected submission leaves no tracking entry behind.
    pub async fn submit_job(&self, descriptor: JobDescriptor) -> SubmitOutcome {
        let id = descriptor.id;

        if !self.can_accept_jobs().await {
            return self.reject(id, RejectReason::AtCapacity);
        }
        if self.jobs.contains_key(&id) {
            return self.reject(id, RejectReason::DuplicateJob);
        }
        let processor = match self.registry.get(&descriptor.processor) {
            Ok(processor) => processor,
            Err(_) => {
                return self.reject(
                    id,
                    RejectReason::UnsupportedProcessor(descriptor.processor.clone()),
                );
            }
        };

        let slot = match self.jobs.entry(id) {
            Entry::Occupied(_) => return self.reject(id, RejectReason::DuplicateJob),
            Entry::Vacant(slot) => slot,
        };
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            drop(slot);
            return self.reject(id, RejectReason::PoolSaturated);
        };

        let descriptor = Arc::new(descriptor);
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RunnableState::Submitted);

        let runnable = JobRunnable {
            descriptor: descriptor.clone(),
            processor,
            store: self.store.clone(),
            objects: self.objects.clone(),
            rehydrator: self.rehydrator.clone(),
            telemetry: self.telemetry.clone(),
            cancel: cancel.clone(),
            state: state_tx,
        };
        let task = self.runtime.spawn(async move {
            let _permit = permit;
            runnable.run().await;
        });

        slot.insert(EngineJob {
            descriptor: descriptor.clone(),
            cancel,
            task,
            started: Instant::now(),
            state: state_rx.clone(),
            timed_out: false,
            timeout_recorded: false,
        });

        info!(
            job = %id,
            tenant = %descriptor.tenant_id,
            integration = %descriptor.integration_id,
            processor = %descriptor.processor,
            timeout_ms = descriptor.timeout.as_millis() as u64,
            "job dispatched"
        );
        SubmitOutcome::Dispatched(JobHandle::new(id, state_rx))
    }

    fn reject(&self, id: JobId, reason: RejectReason) -> SubmitOutcome {
        match &reason {
            RejectReason::UnsupportedProcessor(name) => {
                warn!(job = %id, processor = %name, "job rejected: unsupported processor");
            }
            other => info!(job = %id, reason = other.as_str(), "job rejected"),
        }
        SubmitOutcome::Rejected(reason)
    }

    /// Whether a new job would currently be admitted.
    ///
    /// Above the retention ceiling, completed entries are swept first.
    pub async fn can_accept_jobs(&self) -> bool {
        let tracked = self.jobs.len();
        if tracked > self.config.retention_ceiling {
            debug!(
                tracked,
                ceiling = self.config.retention_ceiling,
                "tracking table over retention ceiling; sweeping"
            );
            self.ensure_done_jobs_marked_as_terminated().await;
        }
        self.active_job_count() < self.config.worker_threads
    }

    /// Tracked jobs whose task has not completed.
    pub fn active_job_count(&self) -> usize {
        self.jobs.iter().filter(|job| !job.is_finished()).count()
    }

    /// All tracked jobs, completed-but-unswept included.
    pub fn tracked_job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn job_phase(&self, id: JobId) -> Option<JobPhase> {
        self.jobs.get(&id).map(|job| job.phase())
    }

    /// Cancel every running job. Entries stay tracked until swept.
    pub fn shutdown(&self) -> usize {
        let mut cancelled = 0;
        for job in self.jobs.iter() {
            if !job.is_finished() {
                job.cancel.cancel();
                cancelled += 1;
            }
        }
        info!(cancelled, "engine shutdown: cancellation requested for running jobs");
        cancelled
    }
}
