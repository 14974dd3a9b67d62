// src/registry.rs

//! Name → processor lookup, populated once at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::errors::{EtlError, Result};
use crate::pipeline::{EtlProcessor, JobContext, JobKind, PipelineReport, drive};
use crate::store::JobStateStore;

/// Type-erased view of an [`EtlProcessor`], so processors with different
/// state types can live in one registry.
#[async_trait]
pub trait DynProcessor: Send + Sync {
    fn job_kind(&self) -> JobKind;

    fn stage_names(&self) -> Vec<String>;

    async fn execute(&self, ctx: &JobContext, store: &dyn JobStateStore) -> Result<PipelineReport>;
}

#[async_trait]
impl<P: EtlProcessor> DynProcessor for P {
    fn job_kind(&self) -> JobKind {
        EtlProcessor::job_kind(self)
    }

    fn stage_names(&self) -> Vec<String> {
        self.stages().iter().map(|s| s.name().to_string()).collect()
    }

    async fn execute(&self, ctx: &JobContext, store: &dyn JobStateStore) -> Result<PipelineReport> {
        drive(self, ctx, store).await
    }
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn DynProcessor>>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` under `name`. Names must be non-empty and unique.
    pub fn register<P: EtlProcessor>(&mut self, name: impl Into<String>, processor: P) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EtlError::ConfigError(
                "processor name must not be empty".to_string(),
            ));
        }
        if self.processors.contains_key(&name) {
            return Err(EtlError::ConfigError(format!(
                "processor '{name}' is already registered"
            )));
        }
        info!(processor = %name, stages = ?processor.stage_names(), "registered processor");
        self.processors.insert(name, Arc::new(processor));
        Ok(())
    }

    /// Look up a processor.
    ///
    /// An unknown name is a caller/config error, reported as
    /// [`EtlError::UnsupportedProcessor`] rather than a job failure.
    pub fn get(&self, name: &str) -> Result<Arc<dyn DynProcessor>> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| EtlError::UnsupportedProcessor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    /// Fail on the first name in `names` that has no registered processor.
    pub fn ensure_known<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            if !self.contains(name) {
                return Err(EtlError::UnsupportedProcessor(name.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;

    struct Empty {
        stages: Vec<PipelineStage<()>>,
    }

    #[async_trait]
    impl EtlProcessor for Empty {
        type State = ();

        fn job_kind(&self) -> JobKind {
            JobKind::Generic
        }

        fn create_state(&self, _ctx: &JobContext) -> Self::State {}

        fn stages(&self) -> &[PipelineStage<()>] {
            &self.stages
        }
    }

    #[test]
    fn unknown_processor_is_a_distinct_error() {
        let registry = ProcessorRegistry::new();
        match registry.get("missing") {
            Err(EtlError::UnsupportedProcessor(name)) => assert_eq!(name, "missing"),
            Err(other) => panic!("expected UnsupportedProcessor, got {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let mut registry = ProcessorRegistry::new();
        registry.register("a", Empty { stages: vec![] }).unwrap();
        assert!(registry.register("a", Empty { stages: vec![] }).is_err());
        assert!(registry.register("  ", Empty { stages: vec![] }).is_err());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn ensure_known_reports_first_unknown_name() {
        let mut registry = ProcessorRegistry::new();
        registry.register("a", Empty { stages: vec![] }).unwrap();
        assert!(registry.ensure_known(["a"]).is_ok());
        assert!(matches!(
            registry.ensure_known(["a", "b"]),
            Err(EtlError::UnsupportedProcessor(name)) if name == "b"
        ));
    }
}
