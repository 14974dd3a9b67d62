// src/job/descriptor.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite job identity: the job definition plus the instance number of
/// that definition's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub definition_id: Uuid,
    pub instance_id: u32,
}

impl JobId {
    pub fn new(definition_id: Uuid, instance_id: u32) -> Self {
        Self {
            definition_id,
            instance_id,
        }
    }

    /// Fresh definition id, first instance.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4(), 1)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.definition_id, self.instance_id)
    }
}

/// Scheduling priority carried through from the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "1" => Ok(JobPriority::High),
            "medium" | "2" => Ok(JobPriority::Medium),
            "low" | "3" => Ok(JobPriority::Low),
            other => Err(format!(
                "invalid job priority: {other} (expected \"high\", \"medium\" or \"low\")"
            )),
        }
    }
}

/// Immutable description of a single job attempt, created by the external
/// scheduler and handed to [`crate::engine::EtlEngine::submit_job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub tenant_id: String,
    pub integration_id: String,
    /// Source system of the integration (e.g. "jira", "github").
    pub integration_type: String,
    /// Name the processor was registered under.
    pub processor: String,
    pub timeout: Duration,
    pub priority: JobPriority,
    pub attempt: u32,
    pub scheduled_start_time: DateTime<Utc>,
    /// Full re-processing rather than an incremental run.
    pub is_full: bool,
}

impl JobDescriptor {
    pub fn new(
        id: JobId,
        tenant_id: impl Into<String>,
        integration_id: impl Into<String>,
        processor: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            integration_id: integration_id.into(),
            integration_type: String::new(),
            processor: processor.into(),
            timeout,
            priority: JobPriority::default(),
            attempt: 0,
            scheduled_start_time: Utc::now(),
            is_full: false,
        }
    }

    pub fn with_integration_type(mut self, integration_type: impl Into<String>) -> Self {
        self.integration_type = integration_type.into();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_full(mut self, is_full: bool) -> Self {
        self.is_full = is_full;
        self
    }

    pub fn with_scheduled_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_start_time = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_displays_definition_and_instance() {
        let def = Uuid::nil();
        let id = JobId::new(def, 7);
        assert_eq!(id.to_string(), format!("{def}:7"));
    }

    #[test]
    fn priority_parses_names_and_numbers() {
        assert_eq!("HIGH".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert_eq!("3".parse::<JobPriority>().unwrap(), JobPriority::Low);
        assert!("urgent".parse::<JobPriority>().is_err());
        assert_eq!(JobPriority::default(), JobPriority::Medium);
    }

    #[test]
    fn builder_methods_produce_new_values() {
        let base = JobDescriptor::new(JobId::random(), "t1", "i1", "proc", Duration::from_secs(5));
        let full = base.clone().with_full(true).with_attempt(2);
        assert!(!base.is_full);
        assert!(full.is_full);
        assert_eq!(full.attempt, 2);
        assert_eq!(full.id, base.id);
    }
}
