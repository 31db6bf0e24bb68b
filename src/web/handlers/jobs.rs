//! # Job Handlers
//!
//! Submission, status polling and cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{JobId, JobSpec};
use crate::orchestration::JobStatusReport;
use crate::web::errors::ApiResult;
use crate::web::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmissionResponse {
    pub job_id: JobId,
    pub status_url: String,
}

/// Submit a render job: POST /v1/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    Json(spec): Json<JobSpec>,
) -> ApiResult<(StatusCode, Json<JobSubmissionResponse>)> {
    debug!(composition = %spec.composition, frame_count = spec.frame_count, "Received job submission");

    let job_id = state.orchestrator.submit(spec, &state.fleet).await?;
    info!(job_id = %job_id, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobSubmissionResponse {
            status_url: format!("/v1/jobs/{job_id}"),
            job_id,
        }),
    ))
}

/// Poll job status: GET /v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusReport>> {
    let job_id = JobId::parse(job_id)?;
    Ok(Json(state.orchestrator.status(&job_id).await?))
}

/// Cancel a job: DELETE /v1/jobs/{job_id}
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusReport>> {
    let job_id = JobId::parse(job_id)?;
    info!(job_id = %job_id, "Cancelling job on request");
    Ok(Json(state.orchestrator.cancel(&job_id).await?))
}
