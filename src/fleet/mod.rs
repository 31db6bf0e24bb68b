//! # Worker Fleet Manager
//!
//! Deploys, lists and deletes worker revisions and exposes invocation per
//! revision. Callers pass a [`FleetHandle`] explicitly; there is no
//! process-wide "current fleet".

pub mod manager;
pub mod payload;
pub mod substrate;

pub use manager::{FleetHandle, FleetManager, RevisionLease};
pub use payload::{FailureKind, WorkerFailure, WorkerOutcome, WorkerPayload, WorkerResponse};
pub use substrate::{ComputeSubstrate, InProcessSubstrate, RenderWorker};
