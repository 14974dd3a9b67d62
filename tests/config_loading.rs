// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use etl_engine::config::loader::{load_and_validate, load_from_path};
use etl_engine::errors::EtlError;
use etl_engine::job::JobPriority;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn full_config_is_loaded_with_records() -> TestResult {
    let file = write_config(
        r#"
[engine]
worker_threads = 2
supervisor_interval = "500ms"
heartbeat_interval = "2s"

[storage]
root = "/tmp/etl-objects"

[telemetry]
prometheus_listen = "127.0.0.1:9464"

[[job]]
processor = "entity_counter"
tenant_id = "acme"
integration_id = "42"
integration_type = "jira"
timeout = "10m"
definition_id = "6f1c2c7e-9a43-4c55-8d5e-2b3c1f0a9e11"
instance_id = 3
priority = "high"

[[job.records]]
data_type = "issues"
ingestion_job_id = "ing-1"
path = "acme/42/issues-0.json"

[[job.records]]
data_type = "comments"
ingestion_job_id = "ing-1"
"#,
    )?;

    let config = load_and_validate(file.path())?;

    assert_eq!(config.engine.worker_threads, 2);
    assert_eq!(config.engine.supervisor_interval, Duration::from_millis(500));
    assert_eq!(config.engine.heartbeat_interval, Duration::from_secs(2));
    assert_eq!(config.engine.retention_ceiling, 20);
    assert_eq!(config.storage.root.to_str(), Some("/tmp/etl-objects"));
    assert_eq!(
        config.telemetry.prometheus_listen,
        Some("127.0.0.1:9464".parse::<SocketAddr>()?)
    );

    assert_eq!(config.jobs.len(), 1);
    let descriptor = &config.jobs[0].descriptor;
    assert_eq!(descriptor.id.instance_id, 3);
    assert_eq!(descriptor.timeout, Duration::from_secs(600));
    assert_eq!(descriptor.priority, JobPriority::High);
    assert_eq!(descriptor.integration_type, "jira");

    let results = config.ingestion_results();
    let records = results
        .get(&("acme".to_string(), "42".to_string()))
        .ok_or("no records for integration")?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].index, 1);
    assert_eq!(records[1].path, None);
    assert_eq!(
        config.data_types().into_iter().collect::<Vec<_>>(),
        vec!["comments".to_string(), "issues".to_string()]
    );
    Ok(())
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let file = write_config("")?;
    let config = load_and_validate(file.path())?;
    assert_eq!(config.engine.worker_threads, 4);
    assert_eq!(config.engine.supervisor_interval, Duration::from_secs(30));
    assert_eq!(config.engine.heartbeat_interval, Duration::from_secs(60));
    assert!(config.jobs.is_empty());
    assert_eq!(config.telemetry.prometheus_listen, None);
    Ok(())
}

#[test]
fn bad_prometheus_address_fails_deserialization() -> TestResult {
    let file = write_config("[telemetry]\nprometheus_listen = \"not-an-address\"\n")?;
    let err = load_from_path(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::TomlError(_)));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let file = write_config("[engine\nworker_threads = 2")?;
    let err = load_from_path(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/EtlWorker.toml").unwrap_err();
    assert!(matches!(err, EtlError::IoError(_)));
}

#[test]
fn zero_workers_are_rejected() -> TestResult {
    let file = write_config("[engine]\nworker_threads = 0\n")?;
    let err = load_and_validate(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::ConfigError(ref msg) if msg.contains("worker_threads")));
    Ok(())
}

#[test]
fn bad_job_timeout_names_the_job() -> TestResult {
    let file = write_config(
        r#"
[[job]]
processor = "p"
tenant_id = "t"
integration_id = "i"
timeout = "ten minutes"
"#,
    )?;
    let err = load_and_validate(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::ConfigError(ref msg) if msg.contains("[[job]] #1.timeout")));
    Ok(())
}

#[test]
fn duplicate_job_identity_is_rejected() -> TestResult {
    let file = write_config(
        r#"
[[job]]
processor = "p"
tenant_id = "t"
integration_id = "i"
timeout = "1m"
definition_id = "6f1c2c7e-9a43-4c55-8d5e-2b3c1f0a9e11"

[[job]]
processor = "q"
tenant_id = "t"
integration_id = "i"
timeout = "1m"
definition_id = "6f1c2c7e-9a43-4c55-8d5e-2b3c1f0a9e11"
"#,
    )?;
    let err = load_and_validate(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::ConfigError(ref msg) if msg.contains("#2") && msg.contains("duplicate")));
    Ok(())
}

#[test]
fn unknown_priority_fails_deserialization() -> TestResult {
    let file = write_config(
        r#"
[[job]]
processor = "p"
tenant_id = "t"
integration_id = "i"
timeout = "1m"
priority = "urgent"
"#,
    )?;
    let err = load_from_path(file.path()).err().ok_or("expected error")?;
    assert!(matches!(err, EtlError::TomlError(_)));
    Ok(())
}
