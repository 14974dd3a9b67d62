// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use uuid::Uuid;

use crate::config::model::{ConfigFile, EngineSection, JobConfig, JobSpec, RawConfigFile};
use crate::engine::EngineConfig;
use crate::errors::{EtlError, Result};
use crate::job::{JobDescriptor, JobId};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EtlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let engine = validate_engine(&raw.engine)?;
        let jobs = validate_jobs(&raw.job)?;
        Ok(ConfigFile::new_unchecked(engine, raw.storage, raw.telemetry, jobs))
    }
}

fn validate_engine(section: &EngineSection) -> Result<EngineConfig> {
    if section.worker_threads == 0 {
        return Err(EtlError::ConfigError(
            "[engine].worker_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    let supervisor_interval = nonzero_duration("[engine].supervisor_interval", &section.supervisor_interval)?;
    let heartbeat_interval = nonzero_duration("[engine].heartbeat_interval", &section.heartbeat_interval)?;

    let retention_ceiling = section
        .retention_ceiling
        .unwrap_or(section.worker_threads.saturating_mul(10));
    if retention_ceiling < section.worker_threads {
        return Err(EtlError::ConfigError(format!(
            "[engine].retention_ceiling ({}) must be >= worker_threads ({})",
            retention_ceiling, section.worker_threads
        )));
    }

    Ok(EngineConfig {
        worker_threads: section.worker_threads,
        supervisor_interval,
        heartbeat_interval,
        retention_ceiling,
    })
}

fn validate_jobs(jobs: &[JobConfig]) -> Result<Vec<JobSpec>> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(jobs.len());

    for (i, job) in jobs.iter().enumerate() {
        let label = format!("[[job]] #{}", i + 1);

        if job.processor.trim().is_empty() {
            return Err(EtlError::ConfigError(format!(
                "{label}: processor must not be empty"
            )));
        }
        if job.tenant_id.trim().is_empty() || job.integration_id.trim().is_empty() {
            return Err(EtlError::ConfigError(format!(
                "{label}: tenant_id and integration_id must not be empty"
            )));
        }
        let timeout = nonzero_duration(&format!("{label}.timeout"), &job.timeout)?;

        let id = JobId::new(
            job.definition_id.unwrap_or_else(Uuid::new_v4),
            job.instance_id.unwrap_or(1),
        );
        if !seen.insert(id) {
            return Err(EtlError::ConfigError(format!(
                "{label}: duplicate job identity {id}"
            )));
        }

        for record in &job.records {
            if record.data_type.trim().is_empty() {
                return Err(EtlError::ConfigError(format!(
                    "{label}: record data_type must not be empty"
                )));
            }
        }

        let descriptor = JobDescriptor::new(
            id,
            job.tenant_id.clone(),
            job.integration_id.clone(),
            job.processor.clone(),
            timeout,
        )
        .with_integration_type(job.integration_type.clone())
        .with_priority(job.priority.unwrap_or_default())
        .with_full(job.is_full);

        specs.push(JobSpec {
            descriptor,
            records: job.records.clone(),
        });
    }

    Ok(specs)
}

fn nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| EtlError::ConfigError(format!("{field}: {e}")))?;
    if duration.is_zero() {
        return Err(EtlError::ConfigError(format!("{field} must be non-zero")));
    }
    Ok(duration)
}

/// Parse `<number><unit>` with unit one of `ms`, `s`, `m`, `h`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RecordConfig;

    fn job(processor: &str, timeout: &str) -> JobConfig {
        JobConfig {
            processor: processor.to_string(),
            tenant_id: "acme".to_string(),
            integration_id: "1".to_string(),
            integration_type: String::new(),
            timeout: timeout.to_string(),
            definition_id: None,
            instance_id: None,
            priority: None,
            is_full: false,
            records: vec![],
        }
    }

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_errors_not_overflows() {
        let err = parse_duration("18446744073709551615h").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_duration("307445734561825861m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );

        let mut raw = RawConfigFile::default();
        raw.job.push(job("p", "18446744073709551615h"));
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError(msg) if msg.contains("out of range")));
    }

    #[test]
    fn defaults_fill_engine_config() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.engine, EngineConfig::default());
        assert!(cfg.jobs.is_empty());
    }

    #[test]
    fn retention_ceiling_below_workers_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.engine.worker_threads = 8;
        raw.engine.retention_ceiling = Some(4);
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError(msg) if msg.contains("retention_ceiling")));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.engine.heartbeat_interval = "0s".to_string();
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn job_checks() {
        let mut raw = RawConfigFile::default();
        raw.job.push(job("", "1m"));
        assert!(ConfigFile::try_from(raw).is_err());

        let mut raw = RawConfigFile::default();
        raw.job.push(job("p", "0ms"));
        assert!(ConfigFile::try_from(raw).is_err());

        let mut raw = RawConfigFile::default();
        let mut bad_record = job("p", "1m");
        bad_record.records.push(RecordConfig {
            data_type: " ".to_string(),
            ingestion_job_id: "x".to_string(),
            path: None,
        });
        raw.job.push(bad_record);
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let definition = Uuid::new_v4();
        let mut raw = RawConfigFile::default();
        for _ in 0..2 {
            let mut j = job("p", "1m");
            j.definition_id = Some(definition);
            j.instance_id = Some(3);
            raw.job.push(j);
        }
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError(msg) if msg.contains("duplicate")));
    }
}
