// src/processors/entity_counter.rs

//! Built-in processor that counts entities per data type.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::pipeline::{EntityStage, EtlProcessor, JobContext, JobKind, PipelineStage};

/// Per-job accumulator.
#[derive(Debug, Default)]
pub struct EntityCounts {
    pub per_type: BTreeMap<String, u64>,
    pub ingestion_jobs: BTreeSet<String>,
}

struct CountStage {
    name: String,
    data_type: String,
}

#[async_trait]
impl EntityStage<EntityCounts> for CountStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> &str {
        &self.data_type
    }

    async fn process(
        &self,
        _ctx: &JobContext,
        state: &mut EntityCounts,
        ingestion_job_id: &str,
        _entity: Value,
    ) -> anyhow::Result<()> {
        *state.per_type.entry(self.data_type.clone()).or_default() += 1;
        state.ingestion_jobs.insert(ingestion_job_id.to_string());
        Ok(())
    }
}

/// One counting stage per data type, in the order given.
pub struct EntityCounter {
    stages: Vec<PipelineStage<EntityCounts>>,
    totals: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl EntityCounter {
    pub fn new<I, S>(data_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stages = data_types
            .into_iter()
            .map(|data_type| {
                let data_type = data_type.into();
                PipelineStage::entity(CountStage {
                    name: format!("count_{data_type}"),
                    data_type,
                })
            })
            .collect();
        Self {
            stages,
            totals: Arc::default(),
        }
    }

    /// Shared view of the counts accumulated by every finished job.
    pub fn totals(&self) -> Arc<Mutex<BTreeMap<String, u64>>> {
        self.totals.clone()
    }
}

#[async_trait]
impl EtlProcessor for EntityCounter {
    type State = EntityCounts;

    fn job_kind(&self) -> JobKind {
        JobKind::IngestionResults
    }

    fn create_state(&self, _ctx: &JobContext) -> Self::State {
        EntityCounts::default()
    }

    fn stages(&self) -> &[PipelineStage<EntityCounts>] {
        &self.stages
    }

    async fn post_process(&self, ctx: &JobContext, state: &mut EntityCounts) -> anyhow::Result<()> {
        info!(
            job = %ctx.job_id(),
            tenant = ctx.tenant_id(),
            integration = ctx.integration_id(),
            counts = ?state.per_type,
            ingestion_jobs = state.ingestion_jobs.len(),
            "entity counts"
        );
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        for (data_type, count) in &state.per_type {
            *totals.entry(data_type.clone()).or_default() += count;
        }
        Ok(())
    }
}
