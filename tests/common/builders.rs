//! Wiring for end-to-end orchestrator tests: in-memory storage, an
//! in-process fleet running a [`ScriptedWorker`], and fast retry settings.

use std::sync::Arc;
use std::time::Duration;

use renderfleet_core::config::RenderFleetConfig;
use renderfleet_core::fleet::{FleetHandle, FleetManager, InProcessSubstrate};
use renderfleet_core::models::{ArtifactRef, JobId, Region};
use renderfleet_core::orchestration::{
    JobOrchestrator, JobStatusReport, StaticCompositionResolver,
};
use renderfleet_core::storage::{MemoryBackend, StorageBackend, StorageManager};

use super::mock_worker::ScriptedWorker;

pub const TEST_REGION: &str = "us-east-1";
pub const TEST_COMPOSITION: &str = "intro";

/// Short delays everywhere so retry paths finish in milliseconds
pub fn test_config() -> RenderFleetConfig {
    let mut config = RenderFleetConfig::default();
    config.dispatch.max_concurrency = 4;
    config.dispatch.max_retries = 3;
    config.backoff.base_delay_ms = 1;
    config.backoff.max_delay_ms = 5;
    config.backoff.jitter_enabled = false;
    config.timeouts.invocation_timeout_ms = 200;
    config.timeouts.job_timeout_seconds = 10;
    config.stitch.retry_delay_ms = 1;
    config.storage.default_region = TEST_REGION.to_string();
    config
}

pub struct TestHarness {
    pub orchestrator: JobOrchestrator,
    pub fleet: FleetHandle,
    pub fleet_manager: Arc<FleetManager>,
    pub storage: Arc<StorageManager>,
    pub backend: MemoryBackend,
    pub worker: Arc<ScriptedWorker>,
}

pub struct HarnessBuilder {
    config: RenderFleetConfig,
    backend: MemoryBackend,
    storage_backend: Option<Arc<dyn StorageBackend>>,
    worker: Option<ScriptedWorker>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            backend: MemoryBackend::new(),
            storage_backend: None,
            worker: None,
        }
    }

    /// Backend the scripted worker should write its segments to
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        Arc::new(self.backend.clone())
    }

    pub fn with_config(mut self, configure: impl FnOnce(&mut RenderFleetConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    /// Shared memory backend, for wrapping in [`Self::with_storage`]
    pub fn memory(&self) -> MemoryBackend {
        self.backend.clone()
    }

    /// Storage the orchestrator uses; workers keep writing to the memory
    /// backend directly
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage_backend = Some(storage);
        self
    }

    pub fn with_worker(mut self, configure: impl FnOnce(ScriptedWorker) -> ScriptedWorker) -> Self {
        let worker = ScriptedWorker::new(self.backend());
        self.worker = Some(configure(worker));
        self
    }

    pub async fn build(self) -> TestHarness {
        let backend = self.backend.clone();
        let worker = Arc::new(
            self.worker
                .unwrap_or_else(|| ScriptedWorker::new(Arc::new(backend.clone()))),
        );
        let storage_backend: Arc<dyn StorageBackend> = match self.storage_backend {
            Some(storage) => storage,
            None => Arc::new(backend.clone()),
        };
        let storage = Arc::new(StorageManager::new(
            storage_backend,
            self.config.storage.clone(),
        ));
        let fleet_manager = Arc::new(FleetManager::new(
            Arc::new(InProcessSubstrate::new(worker.clone())),
            self.config.fleet.clone(),
            self.config.timeouts.invocation_timeout(),
        ));
        let revision = fleet_manager
            .deploy(
                ArtifactRef::new("render-worker", "1.0.0"),
                Region::new(TEST_REGION),
                2048,
                60,
            )
            .await
            .expect("deploy test revision");
        let fleet = FleetHandle::new(Arc::clone(&fleet_manager), revision.revision_id)
            .expect("fleet handle");

        let resolver = Arc::new(
            StaticCompositionResolver::new()
                .register(TEST_COMPOSITION, Some(10_000))
                .register("open-ended", None),
        );
        let orchestrator =
            JobOrchestrator::builder(self.config, Arc::clone(&storage), resolver).build();

        TestHarness {
            orchestrator,
            fleet,
            fleet_manager,
            storage,
            backend,
            worker,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub async fn wait(&self, job_id: &JobId) -> JobStatusReport {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.orchestrator
                .wait_for_terminal(job_id, Duration::from_millis(5)),
        )
        .await
        .expect("job did not reach a terminal state in time")
        .expect("status lookup failed")
    }

    /// Poll until `condition` holds or a second passes
    pub async fn wait_until(&self, condition: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
