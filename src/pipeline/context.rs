// src/pipeline/context.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{EtlError, Result};
use crate::job::{DataResultRef, JobDescriptor, JobId, JobPayload};
use crate::objects::ObjectStore;

/// Read-only view of one job attempt, handed to every processor hook.
///
/// A context is built once per attempt. Rehydration derives a new value via
/// [`JobContext::with_payload`] rather than mutating a shared one.
#[derive(Debug, Clone)]
pub struct JobContext {
    descriptor: Arc<JobDescriptor>,
    payload: Option<Arc<JobPayload>>,
    checkpoints: Arc<BTreeMap<String, usize>>,
    objects: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(
        descriptor: Arc<JobDescriptor>,
        objects: Arc<dyn ObjectStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            payload: None,
            checkpoints: Arc::new(BTreeMap::new()),
            objects,
            cancel,
        }
    }

    pub fn with_payload(&self, payload: JobPayload) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            ..self.clone()
        }
    }

    /// Stage progress recorded by earlier attempts.
    pub fn with_checkpoints(&self, checkpoints: BTreeMap<String, usize>) -> Self {
        Self {
            checkpoints: Arc::new(checkpoints),
            ..self.clone()
        }
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn job_id(&self) -> JobId {
        self.descriptor.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.descriptor.tenant_id
    }

    pub fn integration_id(&self) -> &str {
        &self.descriptor.integration_id
    }

    pub fn payload(&self) -> Option<&JobPayload> {
        self.payload.as_deref()
    }

    pub fn checkpoint(&self, stage: &str) -> Option<usize> {
        self.checkpoints.get(stage).copied()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Error out if the job has been asked to stop.
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EtlError::Cancelled(self.job_id()));
        }
        Ok(())
    }

    /// Fetch the entities of one data record from the object store.
    pub async fn load_entities(&self, record: &DataResultRef) -> Result<Vec<Value>> {
        let Some(path) = record.path.as_deref() else {
            return Ok(Vec::new());
        };
        let bytes = self.objects.get(path).await?;
        let entities: Vec<Value> = serde_json::from_slice(&bytes)?;
        Ok(entities)
    }
}
