//! # System Constants
//!
//! Lifecycle event names and operational limits shared across components.

/// Lifecycle events published through [`crate::events::EventPublisher`]
pub mod events {
    // Job lifecycle events
    pub const JOB_SUBMITTED: &str = "job.submitted";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_STITCHING: &str = "job.stitching";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_TIMED_OUT: &str = "job.timed_out";
    pub const JOB_CANCELLED: &str = "job.cancelled";

    // Chunk lifecycle events
    pub const CHUNK_INVOKED: &str = "chunk.invoked";
    pub const CHUNK_RENDERED: &str = "chunk.rendered";
    pub const CHUNK_RETRY_SCHEDULED: &str = "chunk.retry_scheduled";
    pub const CHUNK_FAILED: &str = "chunk.failed";
    pub const CHUNK_RESULT_DISCARDED: &str = "chunk.result_discarded";
}

/// System-wide limits
pub mod system {
    /// Maximum length of a caller-supplied job identifier
    pub const MAX_JOB_ID_LENGTH: usize = 64;

    /// Length of a system-generated job identifier
    pub const GENERATED_JOB_ID_LENGTH: usize = 12;

    /// Upper bound on chunks in one job; keeps the progress record bounded
    pub const MAX_CHUNKS_PER_JOB: u64 = 100_000;

    /// Extra wait past the invocation timeout for in-flight invocations to
    /// return once a job has ended
    pub const IN_FLIGHT_SETTLE_GRACE_MS: u64 = 1_000;

    pub const RENDERFLEET_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
}
