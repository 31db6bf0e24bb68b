use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted, no chunk dispatched yet
    #[default]
    Pending,
    /// At least one chunk has been dispatched
    InProgress,
    /// Every chunk rendered, output being merged
    Stitching,
    /// Output artifact written
    Done,
    /// Unrecoverable chunk error, stitch failure or cancellation
    Failed,
    /// Wall-clock budget exceeded before reaching done
    TimedOut,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }

    /// Check if the job is still consuming worker capacity
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Stitching)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Stitching => write!(f, "stitching"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "stitching" => Ok(Self::Stitching),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// Chunk lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Waiting for an invocation slot
    #[default]
    Queued,
    /// Handed to a worker
    Invoked,
    /// Worker reported it is rendering
    Rendering,
    /// Output blob written
    Rendered,
    /// Permanent failure or retries exhausted
    Failed,
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rendered | Self::Failed)
    }

    /// Invoked or rendering: a worker currently owns the chunk
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Invoked | Self::Rendering)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Invoked => write!(f, "invoked"),
            Self::Rendering => write!(f, "rendering"),
            Self::Rendered => write!(f, "rendered"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ChunkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "invoked" => Ok(Self::Invoked),
            "rendering" => Ok(Self::Rendering),
            "rendered" => Ok(Self::Rendered),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid chunk state: {s}")),
        }
    }
}
