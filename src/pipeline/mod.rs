// src/pipeline/mod.rs

//! Stage-pipeline abstraction implemented by every processor.
//!
//! A processor declares:
//! - its [`JobKind`] (whether it needs a rehydrated payload),
//! - how to build its job-scoped mutable state,
//! - pipeline-level `pre_process` / `post_process` hooks,
//! - an ordered list of [`PipelineStage`]s.
//!
//! The [`driver`] walks that list for one job; the processor bodies are plain
//! domain code returning `anyhow::Result`.

pub mod context;
pub mod driver;

use async_trait::async_trait;
use serde_json::Value;

pub use context::JobContext;
pub use driver::{PipelineReport, StageReport, drive, eligible_records};

/// What kind of input a processor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Processes ingestion results; the payload is rehydrated first.
    IngestionResults,
    /// Data-less job; rehydration is skipped.
    Generic,
}

impl JobKind {
    pub fn requires_payload(&self) -> bool {
        matches!(self, JobKind::IngestionResults)
    }
}

/// A registered pipeline implementation.
#[async_trait]
pub trait EtlProcessor: Send + Sync + 'static {
    /// Job-scoped accumulator, created once per attempt and dropped at the end.
    type State: Send + 'static;

    fn job_kind(&self) -> JobKind;

    fn create_state(&self, ctx: &JobContext) -> Self::State;

    /// Stages in execution order.
    fn stages(&self) -> &[PipelineStage<Self::State>];

    async fn pre_process(&self, _ctx: &JobContext, _state: &mut Self::State) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_process(&self, _ctx: &JobContext, _state: &mut Self::State) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A stage scoped to one data type, invoked once per entity.
#[async_trait]
pub trait EntityStage<S: Send>: Send + Sync {
    fn name(&self) -> &str;

    fn data_type(&self) -> &str;

    /// Restrict processing to records of the most recent ingestion job.
    fn only_latest_ingestion_job(&self) -> bool {
        false
    }

    async fn pre_stage(&self, _ctx: &JobContext, _state: &mut S) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(
        &self,
        ctx: &JobContext,
        state: &mut S,
        ingestion_job_id: &str,
        entity: Value,
    ) -> anyhow::Result<()>;

    async fn post_stage(&self, _ctx: &JobContext, _state: &mut S) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A stage that runs once per job without per-entity input.
#[async_trait]
pub trait GenericStage<S: Send>: Send + Sync {
    fn name(&self) -> &str;

    async fn pre_stage(&self, _ctx: &JobContext, _state: &mut S) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(&self, ctx: &JobContext, state: &mut S) -> anyhow::Result<()>;

    async fn post_stage(&self, _ctx: &JobContext, _state: &mut S) -> anyhow::Result<()> {
        Ok(())
    }
}

pub enum PipelineStage<S> {
    Entity(Box<dyn EntityStage<S>>),
    Generic(Box<dyn GenericStage<S>>),
}

impl<S: Send> PipelineStage<S> {
    pub fn entity(stage: impl EntityStage<S> + 'static) -> Self {
        PipelineStage::Entity(Box::new(stage))
    }

    pub fn generic(stage: impl GenericStage<S> + 'static) -> Self {
        PipelineStage::Generic(Box::new(stage))
    }

    pub fn name(&self) -> &str {
        match self {
            PipelineStage::Entity(stage) => stage.name(),
            PipelineStage::Generic(stage) => stage.name(),
        }
    }
}
