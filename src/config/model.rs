// src/config/model.rs

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use uuid::Uuid;

use crate::engine::EngineConfig;
use crate::job::{DataResultRef, JobDescriptor, JobPriority};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// worker_threads = 4
/// supervisor_interval = "30s"
/// heartbeat_interval = "60s"
///
/// [storage]
/// root = ".etl-worker"
///
/// [telemetry]
/// prometheus_listen = "127.0.0.1:9464"
///
/// [[job]]
/// processor = "entity_counter"
/// tenant_id = "acme"
/// integration_id = "42"
/// integration_type = "jira"
/// timeout = "10m"
///
/// [[job.records]]
/// data_type = "issues"
/// ingestion_job_id = "ing-1"
/// path = "acme/42/issues-0.json"
/// ```
///
/// Every section is optional. Semantic checks live in `validate.rs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Jobs submitted by the host binary at startup.
    #[serde(default)]
    pub job: Vec<JobConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holders can rely on
/// every invariant checked there.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub storage: StorageSection,
    pub telemetry: TelemetrySection,
    pub jobs: Vec<JobSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        storage: StorageSection,
        telemetry: TelemetrySection,
        jobs: Vec<JobSpec>,
    ) -> Self {
        Self {
            engine,
            storage,
            telemetry,
            jobs,
        }
    }

    /// Configured ingestion records keyed by `(tenant_id, integration_id)`.
    ///
    /// Records of jobs sharing an integration are concatenated in file order
    /// and indexed by their position in that list.
    pub fn ingestion_results(&self) -> HashMap<(String, String), Vec<DataResultRef>> {
        let mut results: HashMap<(String, String), Vec<DataResultRef>> = HashMap::new();
        for job in &self.jobs {
            let key = (
                job.descriptor.tenant_id.clone(),
                job.descriptor.integration_id.clone(),
            );
            let records = results.entry(key).or_default();
            for record in &job.records {
                records.push(DataResultRef {
                    data_type: record.data_type.clone(),
                    ingestion_job_id: record.ingestion_job_id.clone(),
                    index: records.len(),
                    path: record.path.clone(),
                });
            }
        }
        results
    }

    /// Every data type named by a configured record.
    pub fn data_types(&self) -> BTreeSet<String> {
        self.jobs
            .iter()
            .flat_map(|job| job.records.iter().map(|r| r.data_type.clone()))
            .collect()
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Period of the supervisor pass, e.g. `"30s"`.
    #[serde(default = "default_supervisor_interval")]
    pub supervisor_interval: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: String,

    /// Defaults to ten times `worker_threads`.
    #[serde(default)]
    pub retention_ceiling: Option<usize>,
}

fn default_worker_threads() -> usize {
    4
}

fn default_supervisor_interval() -> String {
    "30s".to_string()
}

fn default_heartbeat_interval() -> String {
    "60s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            supervisor_interval: default_supervisor_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            retention_ceiling: None,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Root directory of the file-backed object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".etl-worker")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// `[telemetry]` section.
///
/// Without `prometheus_listen` the worker records no metrics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySection {
    /// Address of the Prometheus scrape endpoint.
    #[serde(default)]
    pub prometheus_listen: Option<SocketAddr>,
}

/// One `[[job]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub processor: String,
    pub tenant_id: String,
    pub integration_id: String,

    #[serde(default)]
    pub integration_type: String,

    /// Duration string, e.g. `"90s"` or `"10m"`.
    pub timeout: String,

    /// Generated when absent.
    #[serde(default)]
    pub definition_id: Option<Uuid>,

    #[serde(default)]
    pub instance_id: Option<u32>,

    /// Submission order within the worker: `high` jobs go first.
    #[serde(default)]
    pub priority: Option<JobPriority>,

    #[serde(default)]
    pub is_full: bool,

    /// Ingestion results available for this job's integration.
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

/// One `[[job.records]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    pub data_type: String,
    pub ingestion_job_id: String,

    /// Object-store path of the record's entity array.
    #[serde(default)]
    pub path: Option<String>,
}

/// A validated job: the descriptor to submit plus its ingestion records.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub descriptor: JobDescriptor,
    pub records: Vec<RecordConfig>,
}
