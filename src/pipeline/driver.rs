// src/pipeline/driver.rs

//! Drives one processor's pipeline for one job attempt.

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{EntityStage, EtlProcessor, GenericStage, JobContext, PipelineStage};
use crate::errors::{EtlError, Result};
use crate::job::{DataResultRef, EntityProgress, JobId, JobPayload, JobStateUpdate, JobStatus};
use crate::store::JobStateStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn entities_processed(&self) -> u64 {
        self.stages.iter().map(|s| s.entities).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub records: usize,
    pub entities: u64,
}

impl StageReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Records an entity stage will visit, in index order.
///
/// - only records of `data_type`;
/// - with `only_latest`, only records of the payload's latest ingestion job;
/// - records at or below `checkpoint` were finished by an earlier attempt
///   and are skipped.
pub fn eligible_records<'a>(
    payload: &'a JobPayload,
    data_type: &str,
    only_latest: bool,
    checkpoint: Option<usize>,
) -> Vec<&'a DataResultRef> {
    let latest = if only_latest {
        payload.latest_ingestion_job_id()
    } else {
        None
    };
    payload
        .records_for(data_type)
        .into_iter()
        .filter(|r| latest.is_none_or(|job| r.ingestion_job_id == job))
        .filter(|r| checkpoint.is_none_or(|done| r.index > done))
        .collect()
}

/// Run `processor` over `ctx` and persist the terminal status it reached.
///
/// `Success` and `Failure` are both written conditionally on the job still
/// being `Running`, so a status forced by the supervisor is never
/// overwritten. A cancelled pipeline writes nothing.
pub async fn drive<P: EtlProcessor>(
    processor: &P,
    ctx: &JobContext,
    store: &dyn JobStateStore,
) -> Result<PipelineReport> {
    let id = ctx.job_id();

    match run_stages(processor, ctx, store).await {
        Ok(report) => {
            let recorded = store
                .update(
                    id,
                    JobStateUpdate::status(JobStatus::Success).when_status(JobStatus::Running),
                )
                .await?;
            if !recorded {
                warn!(job = %id, "job no longer RUNNING; SUCCESS not recorded");
            }
            Ok(report)
        }
        Err(EtlError::Cancelled(id)) => Err(EtlError::Cancelled(id)),
        Err(err) => {
            let update =
                JobStateUpdate::status(JobStatus::Failure).when_status(JobStatus::Running);
            if let Err(persist_err) = store.update(id, update).await {
                warn!(job = %id, error = %persist_err, "failed to record FAILURE status");
            }
            Err(err)
        }
    }
}

async fn run_stages<P: EtlProcessor>(
    processor: &P,
    ctx: &JobContext,
    store: &dyn JobStateStore,
) -> Result<PipelineReport> {
    let mut state = processor.create_state(ctx);

    processor
        .pre_process(ctx, &mut state)
        .await
        .context("pre_process failed")?;

    let mut report = PipelineReport::default();
    for stage in processor.stages() {
        ctx.ensure_not_cancelled()?;
        let stage_report = match stage {
            PipelineStage::Entity(stage) => {
                run_entity_stage(stage.as_ref(), ctx, &mut state, store).await?
            }
            PipelineStage::Generic(stage) => {
                run_generic_stage(stage.as_ref(), ctx, &mut state).await?
            }
        };
        report.stages.push(stage_report);
    }

    ctx.ensure_not_cancelled()?;
    processor
        .post_process(ctx, &mut state)
        .await
        .context("post_process failed")?;

    Ok(report)
}

async fn run_entity_stage<S: Send>(
    stage: &dyn EntityStage<S>,
    ctx: &JobContext,
    state: &mut S,
    store: &dyn JobStateStore,
) -> Result<StageReport> {
    let name = stage.name();
    let records = match ctx.payload() {
        Some(payload) => eligible_records(
            payload,
            stage.data_type(),
            stage.only_latest_ingestion_job(),
            ctx.checkpoint(name),
        ),
        None => Vec::new(),
    };

    info!(
        job = %ctx.job_id(),
        stage = name,
        data_type = stage.data_type(),
        records = records.len(),
        "starting entity stage"
    );

    stage
        .pre_stage(ctx, state)
        .await
        .with_context(|| format!("pre_stage of '{name}' failed"))?;

    let mut report = StageReport::new(name);
    for record in records {
        ctx.ensure_not_cancelled()?;

        let loaded = ctx
            .load_entities(record)
            .await
            .with_context(|| format!("stage '{name}': loading record {}", record.index));
        let entities = match loaded {
            Ok(entities) => entities,
            Err(err) => {
                let update =
                    JobStateUpdate::record_progress(name, record.index, EntityProgress::UNREADABLE);
                record_progress(store, ctx.job_id(), name, record.index, update).await;
                return Err(err.into());
            }
        };

        let mut successful = 0i64;
        for entity in entities {
            let processed = stage
                .process(ctx, state, &record.ingestion_job_id, entity)
                .await
                .with_context(|| {
                    format!("stage '{name}': processing entity of record {}", record.index)
                });
            if let Err(err) = processed {
                let counts = EntityProgress::new(successful, 1);
                let update = JobStateUpdate::record_progress(name, record.index, counts);
                record_progress(store, ctx.job_id(), name, record.index, update).await;
                return Err(err.into());
            }
            successful += 1;
            report.entities += 1;
        }

        report.records += 1;
        let update = JobStateUpdate::stage_progress(name, record.index).with_record_progress(
            name,
            record.index,
            EntityProgress::new(successful, 0),
        );
        record_progress(store, ctx.job_id(), name, record.index, update).await;
    }

    stage
        .post_stage(ctx, state)
        .await
        .with_context(|| format!("post_stage of '{name}' failed"))?;

    debug!(job = %ctx.job_id(), stage = name, entities = report.entities, "entity stage finished");
    Ok(report)
}

async fn run_generic_stage<S: Send>(
    stage: &dyn GenericStage<S>,
    ctx: &JobContext,
    state: &mut S,
) -> Result<StageReport> {
    let name = stage.name();
    info!(job = %ctx.job_id(), stage = name, "starting generic stage");

    stage
        .pre_stage(ctx, state)
        .await
        .with_context(|| format!("pre_stage of '{name}' failed"))?;
    stage
        .process(ctx, state)
        .await
        .with_context(|| format!("stage '{name}' failed"))?;
    stage
        .post_stage(ctx, state)
        .await
        .with_context(|| format!("post_stage of '{name}' failed"))?;

    Ok(StageReport::new(name))
}

/// Best-effort write of a record's checkpoint and entity counts.
async fn record_progress(
    store: &dyn JobStateStore,
    id: JobId,
    stage: &str,
    index: usize,
    update: JobStateUpdate,
) {
    match store.update(id, update).await {
        Ok(true) => {}
        Ok(false) => debug!(job = %id, stage, index, "no job state record for progress"),
        Err(e) => warn!(job = %id, stage, index, error = %e, "failed to record stage progress"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::job::{JobDescriptor, JobState};
    use crate::objects::InMemoryObjectStore;
    use crate::pipeline::JobKind;
    use crate::store::InMemoryJobStateStore;

    type Log = Arc<Mutex<Vec<String>>>;

    struct LoggingStage {
        name: String,
        data_type: String,
        only_latest: bool,
        fail_on: Option<i64>,
        log: Log,
    }

    #[async_trait]
    impl EntityStage<Vec<i64>> for LoggingStage {
        fn name(&self) -> &str {
            &self.name
        }

        fn data_type(&self) -> &str {
            &self.data_type
        }

        fn only_latest_ingestion_job(&self) -> bool {
            self.only_latest
        }

        async fn pre_stage(&self, _ctx: &JobContext, _state: &mut Vec<i64>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}:pre", self.name));
            Ok(())
        }

        async fn process(
            &self,
            _ctx: &JobContext,
            state: &mut Vec<i64>,
            ingestion_job_id: &str,
            entity: Value,
        ) -> anyhow::Result<()> {
            let n = entity.as_i64().unwrap_or_default();
            if self.fail_on == Some(n) {
                return Err(anyhow!("entity {n} rejected"));
            }
            state.push(n);
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", self.name, ingestion_job_id, n));
            Ok(())
        }

        async fn post_stage(&self, _ctx: &JobContext, _state: &mut Vec<i64>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}:post", self.name));
            Ok(())
        }
    }

    struct TestProcessor {
        stages: Vec<PipelineStage<Vec<i64>>>,
        log: Log,
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl EtlProcessor for TestProcessor {
        type State = Vec<i64>;

        fn job_kind(&self) -> JobKind {
            JobKind::IngestionResults
        }

        fn create_state(&self, _ctx: &JobContext) -> Vec<i64> {
            Vec::new()
        }

        fn stages(&self) -> &[PipelineStage<Vec<i64>>] {
            &self.stages
        }

        async fn pre_process(&self, _ctx: &JobContext, _state: &mut Vec<i64>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("pre_process".into());
            Ok(())
        }

        async fn post_process(&self, _ctx: &JobContext, state: &mut Vec<i64>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("post_process".into());
            *self.seen.lock().unwrap() = state.clone();
            Ok(())
        }
    }

    fn stage(name: &str, data_type: &str, log: &Log) -> LoggingStage {
        LoggingStage {
            name: name.into(),
            data_type: data_type.into(),
            only_latest: false,
            fail_on: None,
            log: log.clone(),
        }
    }

    fn record(data_type: &str, job: &str, index: usize, path: &str) -> DataResultRef {
        DataResultRef {
            data_type: data_type.into(),
            ingestion_job_id: job.into(),
            index,
            path: Some(path.into()),
        }
    }

    struct Fixture {
        store: InMemoryJobStateStore,
        ctx: JobContext,
    }

    fn fixture(records: Vec<DataResultRef>, cancel: CancellationToken) -> Fixture {
        let objects = InMemoryObjectStore::new();
        objects.add_object("a.json", json!([1, 2]).to_string());
        objects.add_object("b.json", json!([3]).to_string());
        objects.add_object("c.json", json!([4, 5]).to_string());

        let descriptor = JobDescriptor::new(JobId::random(), "t", "i", "test", Duration::from_secs(10));
        let store = InMemoryJobStateStore::new();
        store.insert(JobState::new(descriptor.id).with_status(JobStatus::Running));

        let ctx = JobContext::new(Arc::new(descriptor), Arc::new(objects), cancel)
            .with_payload(JobPayload::new(records));
        Fixture { store, ctx }
    }

    #[tokio::test]
    async fn stages_run_in_declared_order_with_hooks() {
        let log: Log = Arc::default();
        let processor = TestProcessor {
            stages: vec![
                PipelineStage::entity(stage("A", "jira", &log)),
                PipelineStage::entity(stage("B", "prs", &log)),
                PipelineStage::entity(stage("C", "jira", &log)),
            ],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(
            vec![record("jira", "j0", 0, "a.json"), record("prs", "j0", 1, "b.json")],
            CancellationToken::new(),
        );

        let report = drive(&processor, &fx.ctx, &fx.store).await.unwrap();

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "pre_process", "A:pre", "A:j0:1", "A:j0:2", "A:post", "B:pre", "B:j0:3",
                "B:post", "C:pre", "C:j0:1", "C:j0:2", "C:post", "post_process",
            ]
        );
        assert_eq!(report.entities_processed(), 5);
        assert_eq!(*processor.seen.lock().unwrap(), vec![1, 2, 3, 1, 2]);

        let state = fx.store.snapshot(fx.ctx.job_id()).unwrap();
        assert_eq!(state.status, JobStatus::Success);
        assert_eq!(state.progress.get("A"), Some(&0));
        assert_eq!(state.progress.get("B"), Some(&1));
    }

    #[tokio::test]
    async fn checkpointed_records_are_skipped() {
        let log: Log = Arc::default();
        let processor = TestProcessor {
            stages: vec![PipelineStage::entity(stage("A", "jira", &log))],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(
            vec![record("jira", "j0", 0, "a.json"), record("jira", "j1", 2, "c.json")],
            CancellationToken::new(),
        );
        let ctx = fx.ctx.with_checkpoints([("A".to_string(), 0)].into());

        drive(&processor, &ctx, &fx.store).await.unwrap();

        assert_eq!(*processor.seen.lock().unwrap(), vec![4, 5]);
        let state = fx.store.snapshot(ctx.job_id()).unwrap();
        assert_eq!(state.progress.get("A"), Some(&2));
    }

    #[tokio::test]
    async fn latest_only_stage_ignores_older_ingestion_jobs() {
        let log: Log = Arc::default();
        let mut latest = stage("A", "jira", &log);
        latest.only_latest = true;
        let processor = TestProcessor {
            stages: vec![PipelineStage::entity(latest)],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(
            vec![
                record("jira", "j0", 0, "a.json"),
                record("prs", "j1", 1, "b.json"),
                record("jira", "j2", 2, "c.json"),
            ],
            CancellationToken::new(),
        );

        drive(&processor, &fx.ctx, &fx.store).await.unwrap();
        assert_eq!(*processor.seen.lock().unwrap(), vec![4, 5]);
    }

    #[tokio::test]
    async fn failing_entity_aborts_pipeline_and_records_failure() {
        let log: Log = Arc::default();
        let mut failing = stage("A", "jira", &log);
        failing.fail_on = Some(2);
        let processor = TestProcessor {
            stages: vec![
                PipelineStage::entity(failing),
                PipelineStage::entity(stage("B", "prs", &log)),
            ],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(
            vec![record("jira", "j0", 0, "a.json"), record("prs", "j0", 1, "b.json")],
            CancellationToken::new(),
        );

        let err = drive(&processor, &fx.ctx, &fx.store).await.unwrap_err();
        assert!(format!("{err:#}").contains("entity 2 rejected"));

        let log = log.lock().unwrap().clone();
        assert!(!log.iter().any(|l| l.starts_with("B:")));
        assert!(!log.contains(&"post_process".to_string()));
        let state = fx.store.snapshot(fx.ctx.job_id()).unwrap();
        assert_eq!(state.status, JobStatus::Failure);
        assert_eq!(state.progress_details["A"][&0], EntityProgress::new(1, 1));
        assert!(state.progress.get("A").is_none());
    }

    #[tokio::test]
    async fn unreadable_record_is_marked_before_failing() {
        let log: Log = Arc::default();
        let processor = TestProcessor {
            stages: vec![PipelineStage::entity(stage("A", "jira", &log))],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(
            vec![record("jira", "j0", 0, "a.json"), record("jira", "j0", 1, "gone.json")],
            CancellationToken::new(),
        );

        let err = drive(&processor, &fx.ctx, &fx.store).await.unwrap_err();
        assert!(format!("{err:#}").contains("loading record 1"));

        let state = fx.store.snapshot(fx.ctx.job_id()).unwrap();
        assert_eq!(state.progress.get("A"), Some(&0));
        assert_eq!(state.progress_details["A"][&0], EntityProgress::new(2, 0));
        assert_eq!(state.progress_details["A"][&1], EntityProgress::UNREADABLE);
    }

    #[tokio::test]
    async fn cancelled_pipeline_records_nothing() {
        let log: Log = Arc::default();
        let processor = TestProcessor {
            stages: vec![PipelineStage::entity(stage("A", "jira", &log))],
            log: log.clone(),
            seen: Arc::default(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fx = fixture(vec![record("jira", "j0", 0, "a.json")], cancel);

        let err = drive(&processor, &fx.ctx, &fx.store).await.unwrap_err();
        assert!(matches!(err, EtlError::Cancelled(_)));
        assert_eq!(fx.store.snapshot(fx.ctx.job_id()).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn success_does_not_overwrite_forced_failure() {
        let log: Log = Arc::default();
        let processor = TestProcessor {
            stages: vec![PipelineStage::entity(stage("A", "jira", &log))],
            log: log.clone(),
            seen: Arc::default(),
        };
        let fx = fixture(vec![record("jira", "j0", 0, "a.json")], CancellationToken::new());
        fx.store
            .update(fx.ctx.job_id(), JobStateUpdate::status(JobStatus::Failure))
            .await
            .unwrap();

        drive(&processor, &fx.ctx, &fx.store).await.unwrap();
        assert_eq!(fx.store.snapshot(fx.ctx.job_id()).unwrap().status, JobStatus::Failure);
    }

    #[test]
    fn missing_path_records_are_eligible_but_empty() {
        let payload = JobPayload::new(vec![DataResultRef {
            data_type: "jira".into(),
            ingestion_job_id: "j".into(),
            index: 0,
            path: None,
        }]);
        assert_eq!(eligible_records(&payload, "jira", false, None).len(), 1);
        assert!(eligible_records(&payload, "jira", false, Some(0)).is_empty());
    }
}
