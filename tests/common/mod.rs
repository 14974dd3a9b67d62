#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use etl_engine::engine::{EngineConfig, EtlEngine};
use etl_engine::objects::InMemoryObjectStore;
use etl_engine::registry::ProcessorRegistry;
use etl_engine::store::{InMemoryJobStateStore, JobStateStore};
use etl_engine_test_utils::ingestion::CountingIngestionSource;
use etl_engine_test_utils::processors::ScriptedProcessor;
use etl_engine_test_utils::telemetry::RecordingTelemetry;

/// An engine wired to in-memory collaborators the test can inspect.
pub struct Harness {
    pub engine: Arc<EtlEngine>,
    pub store: InMemoryJobStateStore,
    pub objects: InMemoryObjectStore,
    pub ingestion: CountingIngestionSource,
    pub telemetry: RecordingTelemetry,
}

/// Short intervals so supervisor behaviour is observable within a test.
pub fn fast_config(workers: usize) -> EngineConfig {
    EngineConfig {
        worker_threads: workers,
        supervisor_interval: Duration::from_millis(200),
        heartbeat_interval: Duration::from_millis(100),
        retention_ceiling: workers * 10,
    }
}

pub struct HarnessBuilder {
    config: EngineConfig,
    registry: ProcessorRegistry,
    store: InMemoryJobStateStore,
    state_store: Option<Arc<dyn JobStateStore>>,
    ingestion: CountingIngestionSource,
}

impl HarnessBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: ProcessorRegistry::new(),
            store: InMemoryJobStateStore::new(),
            state_store: None,
            ingestion: CountingIngestionSource::default(),
        }
    }

    pub fn processor(mut self, name: &str, processor: ScriptedProcessor) -> Self {
        self.registry.register(name, processor).unwrap();
        self
    }

    pub fn ingestion(mut self, ingestion: CountingIngestionSource) -> Self {
        self.ingestion = ingestion;
        self
    }

    /// Route the engine through `store` while `inner` stays inspectable.
    pub fn state_store(mut self, inner: InMemoryJobStateStore, store: Arc<dyn JobStateStore>) -> Self {
        self.store = inner;
        self.state_store = Some(store);
        self
    }

    pub fn build(self) -> Harness {
        let objects = InMemoryObjectStore::new();
        let telemetry = RecordingTelemetry::new();
        let state_store = self
            .state_store
            .unwrap_or_else(|| Arc::new(self.store.clone()));
        let engine = EtlEngine::builder(self.config, self.registry, state_store)
            .objects(Arc::new(objects.clone()))
            .ingestion(Arc::new(self.ingestion.clone()))
            .telemetry(Arc::new(telemetry.clone()))
            .build()
            .unwrap();
        Harness {
            engine: Arc::new(engine),
            store: self.store,
            objects,
            ingestion: self.ingestion,
            telemetry,
        }
    }
}
