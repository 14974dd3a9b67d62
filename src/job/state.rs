// src/job/state.rs

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobPayload};

/// Persisted lifecycle status of a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Accepted,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        }
    }
}

/// Entity outcome counts for one data record of one stage.
///
/// `successful == -1` marks a record whose data file could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProgress {
    pub successful: i64,
    pub failed: i64,
}

impl EntityProgress {
    pub const UNREADABLE: EntityProgress = EntityProgress {
        successful: -1,
        failed: 0,
    };

    pub fn new(successful: i64, failed: i64) -> Self {
        Self { successful, failed }
    }

    pub fn is_unreadable(&self) -> bool {
        self.successful < 0
    }
}

/// Stage name -> record index -> entity counts.
pub type ProgressDetails = BTreeMap<String, BTreeMap<usize, EntityProgress>>;

/// The durable job record owned by the job-state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub id: JobId,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    /// Inline payload written by older schedulers.
    #[serde(default)]
    pub payload: Option<JobPayload>,
    /// Object-store location of the serialized payload.
    #[serde(default)]
    pub payload_path: Option<String>,
    /// Stage name -> index of the last fully processed record.
    #[serde(default)]
    pub progress: BTreeMap<String, usize>,
    /// Per-record entity counts, written as each record is processed.
    #[serde(default)]
    pub progress_details: ProgressDetails,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl JobState {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            attempt_count: 0,
            last_heartbeat: None,
            started_at: None,
            payload: None,
            payload_path: None,
            progress: BTreeMap::new(),
            progress_details: ProgressDetails::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_payload(mut self, payload: JobPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_payload_path(mut self, path: impl Into<String>) -> Self {
        self.payload_path = Some(path.into());
        self
    }

    pub fn with_progress(mut self, stage: impl Into<String>, index: usize) -> Self {
        self.progress.insert(stage.into(), index);
        self
    }
}

/// Partial update of a [`JobState`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStateUpdate {
    pub status: Option<JobStatus>,
    pub heartbeat: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub payload_path: Option<String>,
    /// Merged into the stored progress map.
    pub progress: Option<BTreeMap<String, usize>>,
    /// Merged per stage and record into the stored details.
    pub progress_details: Option<ProgressDetails>,
    pub increment_attempt: bool,
    /// Only apply when the stored status equals this value.
    pub status_condition: Option<JobStatus>,
}

impl JobStateUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self {
            heartbeat: Some(at),
            ..Default::default()
        }
    }

    pub fn payload_path(path: impl Into<String>) -> Self {
        Self {
            payload_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn stage_progress(stage: impl Into<String>, index: usize) -> Self {
        Self {
            progress: Some(BTreeMap::from([(stage.into(), index)])),
            ..Default::default()
        }
    }

    pub fn record_progress(stage: impl Into<String>, index: usize, counts: EntityProgress) -> Self {
        Self::default().with_record_progress(stage, index, counts)
    }

    pub fn with_record_progress(
        mut self,
        stage: impl Into<String>,
        index: usize,
        counts: EntityProgress,
    ) -> Self {
        self.progress_details
            .get_or_insert_with(ProgressDetails::new)
            .entry(stage.into())
            .or_default()
            .insert(index, counts);
        self
    }

    pub fn when_status(mut self, expected: JobStatus) -> Self {
        self.status_condition = Some(expected);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.heartbeat.is_none()
            && self.started_at.is_none()
            && self.payload_path.is_none()
            && self.progress.is_none()
            && self.progress_details.is_none()
            && !self.increment_attempt
    }

    /// Apply the update to `state`, honouring the status condition.
    ///
    /// Returns `false` (and leaves `state` untouched) when the condition
    /// does not hold.
    pub fn apply_to(&self, state: &mut JobState) -> bool {
        if let Some(expected) = self.status_condition {
            if state.status != expected {
                return false;
            }
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(at) = self.heartbeat {
            state.last_heartbeat = Some(at);
        }
        if let Some(at) = self.started_at {
            state.started_at = Some(at);
        }
        if let Some(ref path) = self.payload_path {
            state.payload_path = Some(path.clone());
        }
        if let Some(ref progress) = self.progress {
            state
                .progress
                .extend(progress.iter().map(|(k, v)| (k.clone(), *v)));
        }
        if let Some(ref details) = self.progress_details {
            for (stage, records) in details {
                state
                    .progress_details
                    .entry(stage.clone())
                    .or_default()
                    .extend(records.iter().map(|(i, c)| (*i, *c)));
            }
        }
        if self.increment_attempt {
            state.attempt_count += 1;
        }
        true
    }
}

/// Filter for bulk reads from the job-state store.
#[derive(Debug, Clone, Default)]
pub struct JobStateFilter {
    pub ids: Option<HashSet<JobId>>,
    pub statuses: Option<HashSet<JobStatus>>,
}

impl JobStateFilter {
    pub fn ids(ids: impl IntoIterator<Item = JobId>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
            statuses: None,
        }
    }

    pub fn matches(&self, state: &JobState) -> bool {
        let id_ok = self.ids.as_ref().is_none_or(|ids| ids.contains(&state.id));
        let status_ok = self
            .statuses
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&state.status));
        id_ok && status_ok
    }
}
