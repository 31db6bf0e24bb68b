use serde::{Deserialize, Serialize};

use crate::models::FailureReason;

/// Events that can trigger job state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// First chunk dispatched
    Start,
    /// Every chunk rendered
    BeginStitch,
    /// Output artifact written
    Complete,
    /// Terminate the job with a reason
    Fail(FailureReason),
    /// Job wall-clock budget elapsed
    TimeOut,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::BeginStitch => "begin_stitch",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::TimeOut => "time_out",
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Fail(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Events that can trigger chunk state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChunkEvent {
    /// Handed to a worker
    Invoke,
    /// Worker acknowledged and is rendering
    Progress,
    /// Output blob written
    Complete,
    /// Terminal failure with error detail
    Fail(String),
    /// Transient failure; back to the queue for another attempt
    Requeue,
}

impl ChunkEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Requeue => "requeue",
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
