//! Scriptable processors for engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use etl_engine::pipeline::{
    EntityStage, EtlProcessor, GenericStage, JobContext, JobKind, PipelineStage,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// What a generic stage does when processed.
#[derive(Debug, Clone)]
pub enum StageAction {
    Succeed,
    Sleep(Duration),
    Fail(String),
    Panic(String),
}

struct ScriptedStage {
    name: String,
    action: StageAction,
    log: CallLog,
}

impl ScriptedStage {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl GenericStage<()> for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_stage(&self, _ctx: &JobContext, _state: &mut ()) -> anyhow::Result<()> {
        self.push(format!("{}:pre", self.name));
        Ok(())
    }

    async fn process(&self, _ctx: &JobContext, _state: &mut ()) -> anyhow::Result<()> {
        self.push(format!("{}:process", self.name));
        match &self.action {
            StageAction::Succeed => Ok(()),
            StageAction::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            StageAction::Fail(msg) => Err(anyhow!("{msg}")),
            StageAction::Panic(msg) => panic!("{msg}"),
        }
    }

    async fn post_stage(&self, _ctx: &JobContext, _state: &mut ()) -> anyhow::Result<()> {
        self.push(format!("{}:post", self.name));
        Ok(())
    }
}

struct RecordingEntityStage {
    name: String,
    data_type: String,
    only_latest: bool,
    log: CallLog,
}

#[async_trait]
impl EntityStage<()> for RecordingEntityStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn only_latest_ingestion_job(&self) -> bool {
        self.only_latest
    }

    async fn process(
        &self,
        _ctx: &JobContext,
        _state: &mut (),
        ingestion_job_id: &str,
        entity: Value,
    ) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, ingestion_job_id, entity));
        Ok(())
    }
}

/// Processor assembled from scripted stages; every hook call is logged.
pub struct ScriptedProcessor {
    kind: JobKind,
    stages: Vec<PipelineStage<()>>,
    log: CallLog,
}

impl ScriptedProcessor {
    pub fn generic() -> Self {
        Self {
            kind: JobKind::Generic,
            stages: Vec::new(),
            log: CallLog::default(),
        }
    }

    pub fn ingestion() -> Self {
        Self {
            kind: JobKind::IngestionResults,
            ..Self::generic()
        }
    }

    pub fn stage(mut self, name: &str, action: StageAction) -> Self {
        self.stages.push(PipelineStage::generic(ScriptedStage {
            name: name.to_string(),
            action,
            log: self.log.clone(),
        }));
        self
    }

    /// Entity stage logging `name:ingestion_job:entity` per entity.
    pub fn entity_stage(mut self, name: &str, data_type: &str, only_latest: bool) -> Self {
        self.stages.push(PipelineStage::entity(RecordingEntityStage {
            name: name.to_string(),
            data_type: data_type.to_string(),
            only_latest,
            log: self.log.clone(),
        }));
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl EtlProcessor for ScriptedProcessor {
    type State = ();

    fn job_kind(&self) -> JobKind {
        self.kind
    }

    fn create_state(&self, _ctx: &JobContext) -> Self::State {}

    fn stages(&self) -> &[PipelineStage<()>] {
        &self.stages
    }

    async fn pre_process(&self, _ctx: &JobContext, _state: &mut ()) -> anyhow::Result<()> {
        self.log.lock().unwrap().push("pre_process".to_string());
        Ok(())
    }

    async fn post_process(&self, _ctx: &JobContext, _state: &mut ()) -> anyhow::Result<()> {
        self.log.lock().unwrap().push("post_process".to_string());
        Ok(())
    }
}

pub fn sleeping(d: Duration) -> ScriptedProcessor {
    ScriptedProcessor::generic().stage("sleep", StageAction::Sleep(d))
}

pub fn failing(msg: &str) -> ScriptedProcessor {
    ScriptedProcessor::generic().stage("fail", StageAction::Fail(msg.to_string()))
}

pub fn panicking(msg: &str) -> ScriptedProcessor {
    ScriptedProcessor::generic().stage("panic", StageAction::Panic(msg.to_string()))
}
