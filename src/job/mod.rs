// src/job/mod.rs

//! Job data model.
//!
//! - [`descriptor`]: the immutable request describing one job attempt.
//! - [`state`]: the persisted job record and partial updates to it.
//! - [`payload`]: the ingestion-result references a job processes.

pub mod descriptor;
pub mod payload;
pub mod state;

pub use descriptor::{JobDescriptor, JobId, JobPriority};
pub use payload::{DataResultRef, JobPayload};
pub use state::{
    EntityProgress, JobState, JobStateFilter, JobStateUpdate, JobStatus, ProgressDetails,
};
