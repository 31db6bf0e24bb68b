use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::JobId;
use crate::constants::system::MAX_CHUNKS_PER_JOB;
use crate::error::{RenderError, RenderResult};
use crate::state_machine::ChunkState;

/// Half-open frame range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty frame range {start}..{end}");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Lookup-only reference from a job to one of its chunks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub job_id: JobId,
    pub index: u32,
}

/// One contiguous unit of rendering work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub job_id: JobId,
    pub index: u32,
    pub frames: FrameRange,
    pub status: ChunkState,
    pub retry_count: u32,
    pub output_key: Option<String>,
    pub error: Option<String>,
    pub render_time_ms: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    pub fn queued(job_id: JobId, index: u32, frames: FrameRange) -> Self {
        Self {
            job_id,
            index,
            frames,
            status: ChunkState::Queued,
            retry_count: 0,
            output_key: None,
            error: None,
            render_time_ms: None,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ChunkId {
        ChunkId {
            job_id: self.job_id.clone(),
            index: self.index,
        }
    }
}

/// Split `[0, frame_count)` into `ceil(frame_count / chunk_size)` chunks.
///
/// Chunk `i` covers `[i * chunk_size, min((i + 1) * chunk_size, frame_count))`;
/// only the last chunk may be shorter.
pub fn plan_chunks(job_id: &JobId, frame_count: u64, chunk_size: u64) -> RenderResult<Vec<Chunk>> {
    if frame_count == 0 {
        return Err(RenderError::invalid_spec("frame count must be greater than 0"));
    }
    if chunk_size == 0 {
        return Err(RenderError::invalid_spec("chunk size must be greater than 0"));
    }

    let chunk_count = frame_count.div_ceil(chunk_size);
    if chunk_count > MAX_CHUNKS_PER_JOB {
        return Err(RenderError::invalid_spec(format!(
            "{chunk_count} chunks exceeds the limit of {MAX_CHUNKS_PER_JOB}; raise the chunk size"
        )));
    }

    Ok((0..chunk_count)
        .map(|i| {
            let start = i * chunk_size;
            let end = start.saturating_add(chunk_size).min(frame_count);
            Chunk::queued(job_id.clone(), i as u32, FrameRange::new(start, end))
        })
        .collect())
}
