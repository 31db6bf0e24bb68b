use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Region;

/// Reference to a packaged worker artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub version: String,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One immutable deployment of the worker artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetRevision {
    pub revision_id: String,
    pub region: Region,
    pub memory_mb: u32,
    pub timeout_seconds: u32,
    pub artifact: ArtifactRef,
    pub created_at: DateTime<Utc>,
}
