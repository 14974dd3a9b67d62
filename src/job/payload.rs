// src/job/payload.rs

use serde::{Deserialize, Serialize};

/// Reference to one batch of ingested data for a single data type.
///
/// The entities themselves live in the object store at `path` as a JSON
/// array. A record without a path carries no entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResultRef {
    pub data_type: String,
    pub ingestion_job_id: String,
    /// Position of the record within the payload; also the checkpoint unit.
    pub index: usize,
    #[serde(default)]
    pub path: Option<String>,
}

/// Input of an ingestion-result job: the ordered data records to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub records: Vec<DataResultRef>,
}

impl JobPayload {
    pub fn new(records: Vec<DataResultRef>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The ingestion job that produced the most recent record (highest index).
    pub fn latest_ingestion_job_id(&self) -> Option<&str> {
        self.records
            .iter()
            .max_by_key(|r| r.index)
            .map(|r| r.ingestion_job_id.as_str())
    }

    /// Records of one data type, in index order.
    pub fn records_for(&self, data_type: &str) -> Vec<&DataResultRef> {
        let mut records: Vec<&DataResultRef> = self
            .records
            .iter()
            .filter(|r| r.data_type == data_type)
            .collect();
        records.sort_by_key(|r| r.index);
        records
    }
}
