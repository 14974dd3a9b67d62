// src/ingestion.rs

//! Upstream ingestion-result collaborator.
//!
//! Only consulted by the "compute from scratch" rehydration tier, when a job
//! has neither a stored payload reference nor an inline payload.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::job::{DataResultRef, JobDescriptor};

#[async_trait]
pub trait IngestionResultSource: Send + Sync {
    /// The data records newly available for the descriptor's integration.
    async fn new_results(&self, descriptor: &JobDescriptor) -> Result<Vec<DataResultRef>>;
}

/// Fixed record lists keyed by `(tenant_id, integration_id)`.
#[derive(Debug, Clone, Default)]
pub struct StaticIngestionResults {
    results: Arc<HashMap<(String, String), Vec<DataResultRef>>>,
}

impl StaticIngestionResults {
    pub fn new(results: HashMap<(String, String), Vec<DataResultRef>>) -> Self {
        Self {
            results: Arc::new(results),
        }
    }
}

#[async_trait]
impl IngestionResultSource for StaticIngestionResults {
    async fn new_results(&self, descriptor: &JobDescriptor) -> Result<Vec<DataResultRef>> {
        let key = (
            descriptor.tenant_id.clone(),
            descriptor.integration_id.clone(),
        );
        Ok(self.results.get(&key).cloned().unwrap_or_default())
    }
}
