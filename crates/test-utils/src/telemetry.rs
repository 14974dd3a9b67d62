use std::sync::{Arc, Mutex};
use std::time::Duration;

use etl_engine::telemetry::TelemetrySink;

#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub name: &'static str,
    pub processor: String,
    pub status: String,
    pub elapsed: Duration,
}

/// Telemetry sink that keeps everything it is sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    gauges: Arc<Mutex<Vec<(&'static str, f64)>>>,
    timings: Arc<Mutex<Vec<TimingRecord>>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauges(&self) -> Vec<(&'static str, f64)> {
        self.gauges.lock().unwrap().clone()
    }

    pub fn last_gauge(&self, name: &str) -> Option<f64> {
        self.gauges
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn timings(&self) -> Vec<TimingRecord> {
        self.timings.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn gauge(&self, name: &'static str, value: f64) {
        self.gauges.lock().unwrap().push((name, value));
    }

    fn timing(&self, name: &'static str, processor: &str, status: &str, elapsed: Duration) {
        self.timings.lock().unwrap().push(TimingRecord {
            name,
            processor: processor.to_string(),
            status: status.to_string(),
            elapsed,
        });
    }
}
