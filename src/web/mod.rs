//! # Web API
//!
//! HTTP polling surface over a [`crate::orchestration::JobOrchestrator`].
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/v1/jobs` | submit a job, `202 Accepted` with its id |
//! | GET | `/v1/jobs/{job_id}` | status report |
//! | DELETE | `/v1/jobs/{job_id}` | cancel |
//! | GET | `/health` | liveness |

pub mod errors;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Build the API router over shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::basic_health))
        .route("/v1/jobs", post(handlers::jobs::submit_job))
        .route(
            "/v1/jobs/{job_id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::cancel_job),
        )
        .with_state(state)
}
