//! Object key naming.
//!
//! Everything for a job lives under `job/{job_id}/`; uploaded compositions
//! live under `sites/{reference}/`.

use crate::models::JobId;

pub fn job_prefix(job_id: &JobId) -> String {
    format!("job/{job_id}/")
}

pub fn chunk_prefix(job_id: &JobId) -> String {
    format!("job/{job_id}/chunk/")
}

pub fn chunk_key(job_id: &JobId, index: u32) -> String {
    format!("job/{job_id}/chunk/{index}")
}

pub fn output_key(job_id: &JobId) -> String {
    format!("job/{job_id}/output")
}

pub fn status_key(job_id: &JobId) -> String {
    format!("job/{job_id}/status.json")
}

pub fn progress_key(job_id: &JobId) -> String {
    format!("job/{job_id}/progress.json")
}

pub fn site_prefix(reference: &str) -> String {
    format!("sites/{}/", reference.trim_matches('/'))
}
