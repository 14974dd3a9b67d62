use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use etl_engine::errors::{EtlError, Result};
use etl_engine::job::{JobId, JobState, JobStateFilter, JobStateUpdate};
use etl_engine::store::{InMemoryJobStateStore, JobStateStore};

/// In-memory store whose writes and bulk reads can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryJobStateStore,
    fail_updates: Arc<AtomicBool>,
    fail_streams: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryJobStateStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &InMemoryJobStateStore {
        &self.inner
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_streams(&self, fail: bool) {
        self.fail_streams.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStateStore for FlakyStore {
    async fn get(&self, id: JobId) -> Result<Option<JobState>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: JobId, update: JobStateUpdate) -> Result<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(EtlError::store("injected update failure"));
        }
        self.inner.update(id, update).await
    }

    async fn stream(&self, filter: JobStateFilter) -> Result<Vec<JobState>> {
        if self.fail_streams.load(Ordering::SeqCst) {
            return Err(EtlError::store("injected stream failure"));
        }
        self.inner.stream(filter).await
    }
}
