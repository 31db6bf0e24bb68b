use serde::{Deserialize, Serialize};

use super::job::JobId;

/// The stitched result of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub job_id: JobId,
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub content_disposition: Option<String>,
}

impl OutputArtifact {
    /// Location reported to pollers
    pub fn url(&self) -> String {
        format!("storage://{}/{}", self.bucket, self.key)
    }
}
