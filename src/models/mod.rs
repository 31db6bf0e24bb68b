//! # Data Model
//!
//! Jobs, chunks, fleet revisions and output artifacts.
//!
//! Chunks refer back to their job by [`JobId`] only; the job owns the
//! authoritative list of chunk identifiers and the progress tracker owns the
//! mutable chunk records.

pub mod artifact;
pub mod chunk;
pub mod job;
pub mod revision;

pub use artifact::OutputArtifact;
pub use chunk::{plan_chunks, Chunk, ChunkId, FrameRange};
pub use job::{Codec, CodecParams, FailureReason, JobId, JobRecord, JobSpec, Region};
pub use revision::{ArtifactRef, FleetRevision};

pub use crate::state_machine::{ChunkState as ChunkStatus, JobState as JobStatus};
