// src/rehydrate.rs

//! Payload rehydration.
//!
//! Resolution order:
//! 1. `payload_path` on the job state → fetch and deserialize from the
//!    object store;
//! 2. inline `payload` on the job state (legacy records);
//! 3. compute from the ingestion-result source, store the result and write
//!    its path back so later attempts take tier 1.
//!
//! Tier 3 only runs when the record carries no payload reference at all. An
//! unreadable reference falls back to an inline payload if there is one and
//! is otherwise fatal to the attempt.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{EtlError, Result};
use crate::ingestion::IngestionResultSource;
use crate::job::{JobDescriptor, JobPayload, JobState, JobStateUpdate};
use crate::objects::ObjectStore;
use crate::store::JobStateStore;

/// Object-store location of a computed payload.
pub fn payload_path_for(descriptor: &JobDescriptor) -> String {
    format!(
        "etl/payloads/{}/{}/{}.json",
        descriptor.tenant_id, descriptor.id.definition_id, descriptor.id.instance_id
    )
}

#[derive(Clone)]
pub struct PayloadRehydrator {
    store: Arc<dyn JobStateStore>,
    objects: Arc<dyn ObjectStore>,
    ingestion: Arc<dyn IngestionResultSource>,
}

impl PayloadRehydrator {
    pub fn new(
        store: Arc<dyn JobStateStore>,
        objects: Arc<dyn ObjectStore>,
        ingestion: Arc<dyn IngestionResultSource>,
    ) -> Self {
        Self {
            store,
            objects,
            ingestion,
        }
    }

    pub async fn rehydrate(&self, descriptor: &JobDescriptor, state: &JobState) -> Result<JobPayload> {
        let id = descriptor.id;

        let stored_error = match state.payload_path.as_deref() {
            Some(path) => match self.load_stored(path).await {
                Ok(payload) => {
                    debug!(job = %id, path, records = payload.records.len(), "payload loaded from object store");
                    return Ok(payload);
                }
                Err(e) => {
                    warn!(job = %id, path, error = %e, "stored payload unreadable");
                    Some(format!("stored payload at '{path}' unreadable: {e}"))
                }
            },
            None => None,
        };

        if let Some(ref payload) = state.payload {
            debug!(job = %id, records = payload.records.len(), "using inline payload");
            return Ok(payload.clone());
        }

        if let Some(reason) = stored_error {
            return Err(EtlError::rehydration(id, reason));
        }

        self.compute(descriptor).await
    }

    async fn load_stored(&self, path: &str) -> Result<JobPayload> {
        let bytes = self.objects.get(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn compute(&self, descriptor: &JobDescriptor) -> Result<JobPayload> {
        let id = descriptor.id;
        let fail = |stage: &str, e: EtlError| EtlError::rehydration(id, format!("{stage}: {e}"));

        let records = self
            .ingestion
            .new_results(descriptor)
            .await
            .map_err(|e| fail("resolving ingestion results", e))?;
        let payload = JobPayload::new(records);

        let path = payload_path_for(descriptor);
        let bytes = serde_json::to_vec(&payload).map_err(|e| fail("serializing payload", e.into()))?;
        self.objects
            .put(&path, bytes)
            .await
            .map_err(|e| fail("storing payload", e))?;

        let recorded = self
            .store
            .update(id, JobStateUpdate::payload_path(path.clone()))
            .await
            .map_err(|e| fail("recording payload path", e))?;
        if !recorded {
            warn!(job = %id, path = %path, "no job state record; payload path not recorded");
        }

        info!(
            job = %id,
            path = %path,
            records = payload.records.len(),
            "computed payload from ingestion results"
        );
        Ok(payload)
    }
}
