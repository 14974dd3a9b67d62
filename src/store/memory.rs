// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::JobStateStore;
use crate::errors::{EtlError, Result};
use crate::job::{JobId, JobState, JobStateFilter, JobStateUpdate};

/// Job-state store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStateStore {
    states: Arc<RwLock<HashMap<JobId, JobState>>>,
}

impl InMemoryJobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, state: JobState) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.insert(state.id, state);
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobState> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStateStore for InMemoryJobStateStore {
    async fn get(&self, id: JobId) -> Result<Option<JobState>> {
        let states = self
            .states
            .read()
            .map_err(|_| EtlError::store("job state lock poisoned"))?;
        Ok(states.get(&id).cloned())
    }

    async fn update(&self, id: JobId, update: JobStateUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(true);
        }
        let mut states = self
            .states
            .write()
            .map_err(|_| EtlError::store("job state lock poisoned"))?;
        match states.get_mut(&id) {
            Some(state) => Ok(update.apply_to(state)),
            None => Ok(false),
        }
    }

    async fn stream(&self, filter: JobStateFilter) -> Result<Vec<JobState>> {
        let states = self
            .states
            .read()
            .map_err(|_| EtlError::store("job state lock poisoned"))?;
        Ok(states
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[tokio::test]
    async fn update_of_missing_record_reports_false() {
        let store = InMemoryJobStateStore::new();
        let applied = store
            .update(JobId::random(), JobStateUpdate::status(JobStatus::Running))
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn stream_returns_only_requested_ids() {
        let store = InMemoryJobStateStore::new();
        let a = JobState::new(JobId::random());
        let b = JobState::new(JobId::random());
        store.insert(a.clone());
        store.insert(b);

        let found = store.stream(JobStateFilter::ids([a.id])).await.unwrap();
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn conditional_update_respects_current_status() {
        let store = InMemoryJobStateStore::new();
        let id = JobId::random();
        store.insert(JobState::new(id).with_status(JobStatus::Failure));

        let applied = store
            .update(
                id,
                JobStateUpdate::status(JobStatus::Success).when_status(JobStatus::Running),
            )
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.snapshot(id).unwrap().status, JobStatus::Failure);
    }
}
