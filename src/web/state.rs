//! # Web API Application State

use crate::fleet::FleetHandle;
use crate::orchestration::JobOrchestrator;

/// Shared by every handler; both fields are cheap to clone
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    /// Revision new submissions render on
    pub fleet: FleetHandle,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator, fleet: FleetHandle) -> Self {
        Self {
            orchestrator,
            fleet,
        }
    }
}
