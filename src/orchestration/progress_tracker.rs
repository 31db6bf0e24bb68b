//! # Progress Tracker
//!
//! Per-job record of every chunk plus an incrementally maintained summary.
//! Each job's record sits behind its own lock, so jobs never contend with
//! each other and writes for one job are serialized.
//!
//! Terminal chunk states are final: a second identical result is a no-op and
//! a conflicting one is rejected with `StaleUpdate`. Once a job is sealed
//! (terminal, or cancelled) every chunk write is rejected, which is how late
//! results from in-flight workers are discarded.
//!
//! A record can be written to `job/{id}/progress.json` and read back as a
//! [`PersistedProgress`], so another orchestrator instance can report on a
//! job it never ran.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::models::{Chunk, JobId};
use crate::state_machine::{ChunkEvent, ChunkState, ChunkStateMachine};
use crate::storage::{keys, BucketHandle};

/// Final result reported for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Rendered {
        output_key: String,
        frames_rendered: u64,
        render_time_ms: u64,
    },
    Failed {
        error: String,
    },
}

/// Whether a write changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Applied,
    Unchanged,
}

/// Audit entry for one invocation attempt, retried or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub chunk_index: u32,
    pub attempt: u32,
    /// `success`, `transient` or `permanent`
    pub outcome: String,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub rendered: u32,
    pub failed: u32,
    /// Queued, invoked or rendering
    pub pending: u32,
}

impl ProgressSummary {
    fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut summary = Self::default();
        for chunk in chunks {
            summary.add(chunk.status);
        }
        summary
    }

    fn add(&mut self, state: ChunkState) {
        match state {
            ChunkState::Rendered => self.rendered += 1,
            ChunkState::Failed => self.failed += 1,
            _ => self.pending += 1,
        }
    }

    fn remove(&mut self, state: ChunkState) {
        match state {
            ChunkState::Rendered => self.rendered -= 1,
            ChunkState::Failed => self.failed -= 1,
            _ => self.pending -= 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.rendered + self.failed + self.pending
    }
}

/// Aggregated view, recomputed on each read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub total_count: u32,
    pub rendered_count: u32,
    pub failed_count: u32,
    pub pending_count: u32,
    pub percent: f64,
    pub estimated_seconds_remaining: Option<f64>,
    pub average_render_time_ms: Option<f64>,
    pub invocations: u64,
    pub billed_duration_ms: u64,
}

impl ProgressSnapshot {
    fn build(
        job_id: &JobId,
        summary: ProgressSummary,
        average_render_time_ms: Option<f64>,
        invocations: &[InvocationRecord],
    ) -> Self {
        let total = summary.total();
        Self {
            job_id: job_id.clone(),
            total_count: total,
            rendered_count: summary.rendered,
            failed_count: summary.failed,
            pending_count: summary.pending,
            percent: if total == 0 {
                0.0
            } else {
                summary.rendered as f64 * 100.0 / total as f64
            },
            estimated_seconds_remaining: average_render_time_ms
                .map(|avg| avg * summary.pending as f64 / 1000.0),
            average_render_time_ms,
            invocations: invocations.len() as u64,
            billed_duration_ms: invocations.iter().map(|i| i.duration_ms).sum(),
        }
    }
}

fn average(times: impl Iterator<Item = u64>) -> Option<f64> {
    let (count, sum) = times.fold((0u64, 0u64), |(count, sum), t| (count + 1, sum + t));
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Progress record as stored at `job/{id}/progress.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProgress {
    pub job_id: JobId,
    pub chunks: Vec<Chunk>,
    pub invocations: Vec<InvocationRecord>,
    pub sealed: bool,
    pub saved_at: DateTime<Utc>,
}

impl PersistedProgress {
    /// Counts recomputed from the stored chunk records; the estimate
    /// averages every rendered chunk rather than a moving window
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::build(
            &self.job_id,
            ProgressSummary::from_chunks(&self.chunks),
            average(self.chunks.iter().filter_map(|chunk| chunk.render_time_ms)),
            &self.invocations,
        )
    }

    pub async fn load(bucket: &BucketHandle, job_id: &JobId) -> RenderResult<Option<Self>> {
        match bucket.get(&keys::progress_key(job_id)).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(RenderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug)]
struct ProgressRecord {
    job_id: JobId,
    chunks: Vec<Chunk>,
    summary: ProgressSummary,
    render_times: VecDeque<u64>,
    invocations: Vec<InvocationRecord>,
    sealed: bool,
}

impl ProgressRecord {
    fn chunk_mut(&mut self, index: u32) -> RenderResult<&mut Chunk> {
        let job_id = &self.job_id;
        self.chunks.get_mut(index as usize).ok_or_else(|| {
            RenderError::not_found(format!("chunk {index} of job {job_id}"))
        })
    }

    fn ensure_open(&self, index: u32) -> RenderResult<()> {
        if self.sealed {
            return Err(RenderError::stale(
                self.job_id.as_str(),
                index,
                "job is sealed",
            ));
        }
        Ok(())
    }

    /// Apply a chunk event and keep the summary in step
    fn apply(&mut self, index: u32, event: &ChunkEvent) -> RenderResult<ChunkState> {
        let job_id = self.job_id.clone();
        let chunk = self.chunk_mut(index)?;
        let from = chunk.status;
        let to = ChunkStateMachine::next_state(from, event)
            .map_err(|e| RenderError::stale(job_id.as_str(), index, e.to_string()))?;

        chunk.status = to;
        chunk.updated_at = Utc::now();
        self.summary.remove(from);
        self.summary.add(to);

        debug_assert_eq!(
            self.summary,
            ProgressSummary::from_chunks(&self.chunks),
            "progress summary drifted from chunk states"
        );
        Ok(to)
    }
}

/// Shared progress store keyed by job id
#[derive(Debug)]
pub struct ProgressTracker {
    records: DashMap<JobId, Arc<Mutex<ProgressRecord>>>,
    moving_average_window: usize,
}

impl ProgressTracker {
    pub fn new(moving_average_window: usize) -> Self {
        Self {
            records: DashMap::new(),
            moving_average_window: moving_average_window.max(1),
        }
    }

    fn record(&self, job_id: &JobId) -> RenderResult<Arc<Mutex<ProgressRecord>>> {
        self.records
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RenderError::not_found(format!("job {job_id}")))
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.records.contains_key(job_id)
    }

    /// Start tracking a job from its planned chunks
    pub fn init_job(&self, job_id: &JobId, chunks: Vec<Chunk>) -> RenderResult<()> {
        let summary = ProgressSummary::from_chunks(&chunks);
        let record = ProgressRecord {
            job_id: job_id.clone(),
            chunks,
            summary,
            render_times: VecDeque::with_capacity(self.moving_average_window),
            invocations: Vec::new(),
            sealed: false,
        };

        match self.records.entry(job_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RenderError::invalid_spec(
                format!("job {job_id} already exists"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(record)));
                Ok(())
            }
        }
    }

    /// Queued to invoked. Returns the 1-based attempt number.
    ///
    /// Rejects a chunk that already has a worker, so no chunk is ever invoked
    /// twice concurrently.
    pub fn record_invocation(&self, job_id: &JobId, index: u32) -> RenderResult<u32> {
        let record = self.record(job_id)?;
        let mut record = record.lock();
        record.ensure_open(index)?;
        record.apply(index, &ChunkEvent::Invoke)?;
        let chunk = record.chunk_mut(index)?;
        Ok(chunk.retry_count + 1)
    }

    pub fn mark_rendering(&self, job_id: &JobId, index: u32) -> RenderResult<()> {
        let record = self.record(job_id)?;
        let mut record = record.lock();
        record.ensure_open(index)?;
        record.apply(index, &ChunkEvent::Progress)?;
        Ok(())
    }

    /// Put an in-flight chunk back in the queue after a transient failure.
    /// Returns the chunk's retry count.
    pub fn requeue_chunk(&self, job_id: &JobId, index: u32, error: &str) -> RenderResult<u32> {
        let record = self.record(job_id)?;
        let mut record = record.lock();
        record.ensure_open(index)?;
        record.apply(index, &ChunkEvent::Requeue)?;
        let chunk = record.chunk_mut(index)?;
        chunk.retry_count += 1;
        chunk.error = Some(error.to_string());
        Ok(chunk.retry_count)
    }

    /// Record a chunk's final outcome.
    ///
    /// Idempotent for a repeated identical outcome; a conflicting outcome for
    /// a terminal chunk, or any write to a sealed job, is `StaleUpdate`.
    pub fn record_chunk_result(
        &self,
        job_id: &JobId,
        index: u32,
        outcome: ChunkOutcome,
    ) -> RenderResult<RecordResult> {
        let record = self.record(job_id)?;
        let mut record = record.lock();

        let chunk = record.chunk_mut(index)?;
        if chunk.status.is_terminal() {
            let same = match (&outcome, chunk.status) {
                (ChunkOutcome::Rendered { output_key, .. }, ChunkState::Rendered) => {
                    chunk.output_key.as_deref() == Some(output_key.as_str())
                }
                (ChunkOutcome::Failed { error }, ChunkState::Failed) => {
                    chunk.error.as_deref() == Some(error.as_str())
                }
                _ => false,
            };
            if same {
                debug!(job_id = %job_id, chunk_index = index, "Duplicate chunk result ignored");
                return Ok(RecordResult::Unchanged);
            }
            return Err(RenderError::stale(
                job_id.as_str(),
                index,
                format!("chunk is already {}", chunk.status),
            ));
        }

        record.ensure_open(index)?;

        match outcome {
            ChunkOutcome::Rendered {
                output_key,
                render_time_ms,
                ..
            } => {
                record.apply(index, &ChunkEvent::Complete)?;
                let chunk = record.chunk_mut(index)?;
                chunk.output_key = Some(output_key);
                chunk.render_time_ms = Some(render_time_ms);
                chunk.error = None;

                if record.render_times.len() == self.moving_average_window {
                    record.render_times.pop_front();
                }
                record.render_times.push_back(render_time_ms);
            }
            ChunkOutcome::Failed { error } => {
                record.apply(index, &ChunkEvent::fail_with_error(error.clone()))?;
                record.chunk_mut(index)?.error = Some(error);
            }
        }

        Ok(RecordResult::Applied)
    }

    /// Append an invocation attempt to the audit log
    pub fn record_invocation_outcome(
        &self,
        job_id: &JobId,
        invocation: InvocationRecord,
    ) -> RenderResult<()> {
        let record = self.record(job_id)?;
        record.lock().invocations.push(invocation);
        Ok(())
    }

    /// Reject all further chunk writes for the job
    pub fn seal(&self, job_id: &JobId) -> RenderResult<()> {
        let record = self.record(job_id)?;
        record.lock().sealed = true;
        Ok(())
    }

    pub fn is_sealed(&self, job_id: &JobId) -> RenderResult<bool> {
        Ok(self.record(job_id)?.lock().sealed)
    }

    pub fn read_progress(&self, job_id: &JobId) -> RenderResult<ProgressSnapshot> {
        let record = self.record(job_id)?;
        let record = record.lock();
        Ok(ProgressSnapshot::build(
            job_id,
            record.summary,
            average(record.render_times.iter().copied()),
            &record.invocations,
        ))
    }

    /// Copy of the full record for persistence
    pub fn export(&self, job_id: &JobId) -> RenderResult<PersistedProgress> {
        let record = self.record(job_id)?;
        let record = record.lock();
        Ok(PersistedProgress {
            job_id: job_id.clone(),
            chunks: record.chunks.clone(),
            invocations: record.invocations.clone(),
            sealed: record.sealed,
            saved_at: Utc::now(),
        })
    }

    /// Write the record to `job/{id}/progress.json`
    pub async fn persist(&self, job_id: &JobId, bucket: &BucketHandle) -> RenderResult<()> {
        let body = serde_json::to_vec(&self.export(job_id)?)?;
        bucket.put(&keys::progress_key(job_id), body.into()).await
    }

    /// Chunk records ordered by sequence index
    pub fn chunk_entries(&self, job_id: &JobId) -> RenderResult<Vec<Chunk>> {
        let record = self.record(job_id)?;
        let mut chunks = record.lock().chunks.clone();
        chunks.sort_by_key(|chunk| chunk.index);
        Ok(chunks)
    }

    pub fn chunk(&self, job_id: &JobId, index: u32) -> RenderResult<Chunk> {
        let record = self.record(job_id)?;
        let mut record = record.lock();
        Ok(record.chunk_mut(index)?.clone())
    }

    pub fn invocation_log(&self, job_id: &JobId) -> RenderResult<Vec<InvocationRecord>> {
        Ok(self.record(job_id)?.lock().invocations.clone())
    }

    /// Recount the summary from chunk states
    pub fn recompute(&self, job_id: &JobId) -> RenderResult<ProgressSummary> {
        let record = self.record(job_id)?;
        let mut record = record.lock();
        record.summary = ProgressSummary::from_chunks(&record.chunks);
        Ok(record.summary)
    }

    /// Forget a job; its persisted record, if any, is left in storage
    pub fn remove(&self, job_id: &JobId) -> bool {
        self.records.remove(job_id).is_some()
    }
}
