//! # Error Types
//!
//! Crate-wide error taxonomy for the render orchestrator.
//!
//! Transient errors are retried inside the component that owns them (the
//! dispatcher retries invocations, the stitcher retries the merge) and only
//! surface once retries are exhausted. Permanent errors propagate straight to
//! the job orchestrator, which terminates the job.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// Bad input, rejected before any side effect
    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    /// Unknown job, revision or storage key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeout, throttling or infrastructure error; retry-eligible
    #[error("Transient error: {0}")]
    Transient(String),

    /// Malformed chunk input, unsupported codec; never retried
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Out-of-order or conflicting progress write
    #[error("Stale update for job {job_id} chunk {chunk_index}: {reason}")]
    StaleUpdate {
        job_id: String,
        chunk_index: u32,
        reason: String,
    },

    /// Stitch requested before every chunk was rendered
    #[error("Job {job_id} is incomplete: {rendered}/{total} chunks rendered")]
    IncompleteJob {
        job_id: String,
        rendered: u32,
        total: u32,
    },

    /// Merge I/O failed on every attempt
    #[error("Stitch failed for job {job_id} after {attempts} attempts: {reason}")]
    StitchFailure {
        job_id: String,
        attempts: u32,
        reason: String,
    },

    /// Revision still referenced by an active orchestration
    #[error("Revision {revision_id} is in use by {active_jobs} active job(s)")]
    RevisionInUse {
        revision_id: String,
        active_jobs: usize,
    },

    /// Transient storage backend failure; callers decide whether to retry
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Illegal lifecycle transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RenderError {
    /// Whether the owning component may retry the failed operation
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::StorageUnavailable(_))
    }

    /// Stable error code used in status reports and HTTP bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "invalid_spec",
            Self::NotFound(_) => "not_found",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
            Self::StaleUpdate { .. } => "stale_update",
            Self::IncompleteJob { .. } => "incomplete_job",
            Self::StitchFailure { .. } => "stitch_failure",
            Self::RevisionInUse { .. } => "revision_in_use",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::InvalidState(_) => "invalid_state",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn stale(job_id: impl Into<String>, chunk_index: u32, reason: impl Into<String>) -> Self {
        Self::StaleUpdate {
            job_id: job_id.into(),
            chunk_index,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(error: serde_json::Error) -> Self {
        RenderError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for RenderError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => RenderError::NotFound(error.to_string()),
            _ => RenderError::StorageUnavailable(error.to_string()),
        }
    }
}

impl From<crate::config::ConfigurationError> for RenderError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        RenderError::Configuration(error.to_string())
    }
}

impl From<crate::state_machine::StateMachineError> for RenderError {
    fn from(error: crate::state_machine::StateMachineError) -> Self {
        RenderError::InvalidState(error.to_string())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
