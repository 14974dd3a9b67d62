#![allow(dead_code)]

use std::time::Duration;

use etl_engine::job::{DataResultRef, JobDescriptor, JobId, JobPriority, JobState};
use etl_engine::store::InMemoryJobStateStore;

/// Builder for `JobDescriptor` with test-friendly defaults.
pub struct DescriptorBuilder {
    descriptor: JobDescriptor,
}

impl DescriptorBuilder {
    pub fn new(processor: &str) -> Self {
        Self {
            descriptor: JobDescriptor::new(
                JobId::random(),
                "tenant-a",
                "integration-1",
                processor,
                Duration::from_secs(30),
            ),
        }
    }

    pub fn id(mut self, id: JobId) -> Self {
        self.descriptor.id = id;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = timeout;
        self
    }

    pub fn tenant(mut self, tenant: &str) -> Self {
        self.descriptor.tenant_id = tenant.to_string();
        self
    }

    pub fn integration(mut self, integration: &str) -> Self {
        self.descriptor.integration_id = integration.to_string();
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.descriptor.priority = priority;
        self
    }

    pub fn build(self) -> JobDescriptor {
        self.descriptor
    }

    /// Build, and seed a `Pending` record for the job into `store`.
    pub fn seeded(self, store: &InMemoryJobStateStore) -> JobDescriptor {
        let descriptor = self.build();
        store.insert(JobState::new(descriptor.id));
        descriptor
    }
}

/// A data record reference.
pub fn record(data_type: &str, ingestion_job_id: &str, index: usize, path: Option<&str>) -> DataResultRef {
    DataResultRef {
        data_type: data_type.to_string(),
        ingestion_job_id: ingestion_job_id.to_string(),
        index,
        path: path.map(str::to_string),
    }
}
