//! # Orchestration Engine
//!
//! Drives a render job from submission to a terminal state.
//!
//! ## Core Components
//!
//! - **JobOrchestrator**: job lifecycle, timeouts, cancellation and status
//! - **Dispatcher**: bounded-concurrency chunk invocation with retries
//! - **ProgressTracker**: per-chunk records and aggregated progress
//! - **Stitcher**: in-order merge of chunk segments into one artifact
//! - **BackoffCalculator** / **ErrorClassifier**: retry policy for worker failures
//! - **CompositionResolver**: checks that a composition exists before planning

pub mod backoff_calculator;
pub mod composition;
pub mod dispatcher;
pub mod error_classifier;
pub mod job_orchestrator;
pub mod progress_tracker;
pub mod stitcher;

pub use backoff_calculator::BackoffCalculator;
pub use composition::{
    CompositionInfo, CompositionResolver, StaticCompositionResolver, StorageSiteResolver,
};
pub use dispatcher::{DispatchOutcome, DispatchReport, DispatchRequest, Dispatcher};
pub use error_classifier::{
    ErrorCategory, ErrorClassification, ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
pub use job_orchestrator::{JobOrchestrator, JobStatusReport, OrchestratorBuilder};
pub use progress_tracker::{
    ChunkOutcome, InvocationRecord, PersistedProgress, ProgressSnapshot, ProgressSummary,
    ProgressTracker, RecordResult,
};
pub use stitcher::{ConcatMerger, SegmentMerger, StitchTarget, Stitcher};
