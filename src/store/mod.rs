// src/store/mod.rs

//! Job-state persistence collaborator.
//!
//! The engine never owns durable state; it reads and writes job records
//! through a [`JobStateStore`]. Production deployments back this with a
//! database service. [`memory::InMemoryJobStateStore`] serves the host binary
//! and tests.

pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::job::{JobId, JobState, JobStateFilter, JobStateUpdate};

pub use memory::InMemoryJobStateStore;

#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn get(&self, id: JobId) -> Result<Option<JobState>>;

    /// Apply a partial update.
    ///
    /// Returns `Ok(false)` when no record matched (missing row or failed
    /// status condition).
    async fn update(&self, id: JobId, update: JobStateUpdate) -> Result<bool>;

    /// Bulk read of every record matching `filter`.
    async fn stream(&self, filter: JobStateFilter) -> Result<Vec<JobState>>;
}
