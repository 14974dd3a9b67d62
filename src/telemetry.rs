// src/telemetry.rs

//! Fire-and-forget telemetry emission.
//!
//! Sinks return nothing, so a broken exporter can never fail a job or a
//! supervisor tick.

use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;

use metrics::{describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::errors::{EtlError, Result};

/// Metric names emitted by the engine.
pub mod names {
    /// Gauge: entries currently held in the engine's tracking table.
    pub const TRACKED_JOBS: &str = "etl_engine_tracked_jobs";
    /// Timer: wall-clock duration of one job runnable.
    pub const JOB_DURATION_SECONDS: &str = "etl_engine_job_duration_seconds";
}

pub trait TelemetrySink: Send + Sync + Debug {
    fn gauge(&self, name: &'static str, value: f64);

    fn timing(&self, name: &'static str, processor: &str, status: &str, elapsed: Duration);
}

/// Sink that forwards to the process-wide `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct MetricsTelemetry;

impl TelemetrySink for MetricsTelemetry {
    fn gauge(&self, name: &'static str, value: f64) {
        gauge!(name).set(value);
    }

    fn timing(&self, name: &'static str, processor: &str, status: &str, elapsed: Duration) {
        histogram!(
            name,
            "processor" => processor.to_string(),
            "status" => status.to_string(),
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Install the process-wide Prometheus recorder with a scrape endpoint on
/// `listen`. Must run inside a tokio runtime; fails if a recorder is
/// already installed.
pub fn install_prometheus(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| EtlError::TelemetryError(format!("prometheus exporter on {listen}: {e}")))?;

    describe_gauge!(names::TRACKED_JOBS, "Entries in the engine tracking table");
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Wall-clock duration of one job run in seconds"
    );
    info!(%listen, "prometheus exporter listening");
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn gauge(&self, _name: &'static str, _value: f64) {}

    fn timing(&self, _name: &'static str, _processor: &str, _status: &str, _elapsed: Duration) {}
}
