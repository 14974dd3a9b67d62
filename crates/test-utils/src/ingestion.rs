use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use etl_engine::errors::Result;
use etl_engine::ingestion::IngestionResultSource;
use etl_engine::job::{DataResultRef, JobDescriptor};

/// Ingestion source returning fixed records and counting how often it was
/// asked.
#[derive(Debug, Clone, Default)]
pub struct CountingIngestionSource {
    results: Arc<Vec<DataResultRef>>,
    calls: Arc<AtomicUsize>,
}

impl CountingIngestionSource {
    pub fn new(results: Vec<DataResultRef>) -> Self {
        Self {
            results: Arc::new(results),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestionResultSource for CountingIngestionSource {
    async fn new_results(&self, _descriptor: &JobDescriptor) -> Result<Vec<DataResultRef>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.as_ref().clone())
    }
}
