//! # Health Check Handlers

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::constants::system::RENDERFLEET_CORE_VERSION;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    /// Jobs this instance has accepted since start
    tracked_jobs: usize,
}

/// Basic health check endpoint: GET /health
pub async fn basic_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: RENDERFLEET_CORE_VERSION.to_string(),
        tracked_jobs: state.orchestrator.job_ids().len(),
    })
}
