//! Boundary to whatever actually runs the workers.

use async_trait::async_trait;
use std::sync::Arc;

use super::payload::{WorkerOutcome, WorkerPayload};
use crate::error::RenderResult;
use crate::models::FleetRevision;

/// The rendering engine: turns one chunk into one stored segment
#[async_trait]
pub trait RenderWorker: Send + Sync + 'static {
    async fn render(&self, payload: WorkerPayload) -> WorkerOutcome;
}

/// Compute platform hosting deployed revisions
#[async_trait]
pub trait ComputeSubstrate: Send + Sync + 'static {
    /// Make a revision invokable
    async fn provision(&self, revision: &FleetRevision) -> RenderResult<()>;

    /// Run one invocation. Deadlines are enforced by the caller.
    async fn invoke(&self, revision: &FleetRevision, payload: WorkerPayload) -> WorkerOutcome;

    async fn decommission(&self, revision: &FleetRevision) -> RenderResult<()>;
}

/// Runs a [`RenderWorker`] on the local tokio runtime.
///
/// Every revision executes the same worker.
#[derive(Clone)]
pub struct InProcessSubstrate {
    worker: Arc<dyn RenderWorker>,
}

impl InProcessSubstrate {
    pub fn new(worker: Arc<dyn RenderWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl ComputeSubstrate for InProcessSubstrate {
    async fn provision(&self, _revision: &FleetRevision) -> RenderResult<()> {
        Ok(())
    }

    async fn invoke(&self, _revision: &FleetRevision, payload: WorkerPayload) -> WorkerOutcome {
        self.worker.render(payload).await
    }

    async fn decommission(&self, _revision: &FleetRevision) -> RenderResult<()> {
        Ok(())
    }
}
