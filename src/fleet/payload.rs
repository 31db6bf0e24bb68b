use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{CodecParams, JobId};

/// Parameters handed to a render worker for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPayload {
    pub job_id: JobId,
    pub chunk_index: u32,
    pub frame_start: u64,
    /// Exclusive
    pub frame_end: u64,
    pub codec_params: CodecParams,
    /// Bucket the worker writes its segment to
    pub bucket: String,
    pub output_key: String,
    /// 1-based attempt number
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub output_key: String,
    pub frames_rendered: u64,
    pub render_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Throttled,
    Infrastructure,
    MalformedInput,
    UnsupportedCodec,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Throttled => "throttled",
            Self::Infrastructure => "infrastructure",
            Self::MalformedInput => "malformed_input",
            Self::UnsupportedCodec => "unsupported_codec",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// What a worker invocation produced. Every call site handles all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Success(WorkerResponse),
    /// Retry-eligible
    Transient(WorkerFailure),
    /// Not retried; fails the job
    Permanent(WorkerFailure),
}

impl WorkerOutcome {
    pub fn transient(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Transient(WorkerFailure::new(kind, message))
    }

    pub fn permanent(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Permanent(WorkerFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}
