#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # RenderFleet Core
//!
//! Distributed render orchestration: a job covering a frame range is split
//! into fixed-size chunks, each chunk is rendered by one invocation on a
//! serverless worker fleet, and the chunk segments are stitched in order into
//! a single output artifact.
//!
//! ## Module Organization
//!
//! - [`models`] - jobs, chunks, revisions and output artifacts
//! - [`state_machine`] - job and chunk lifecycles
//! - [`orchestration`] - job orchestrator, dispatcher, progress tracker, stitcher
//! - [`fleet`] - worker revisions and invocation over a compute substrate
//! - [`storage`] - region-scoped buckets of opaque blobs
//! - [`pricing`] - cost estimates from invocation counts and billed duration
//! - [`download`] - `Content-Disposition` headers for the output artifact
//! - [`config`] - layered TOML configuration
//! - [`events`] - lifecycle event broadcast
//! - `web` - HTTP polling API (feature `web-api`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use renderfleet_core::config::RenderFleetConfig;
//! use renderfleet_core::fleet::{FleetHandle, FleetManager, InProcessSubstrate, RenderWorker};
//! use renderfleet_core::models::{ArtifactRef, Codec, JobSpec, Region};
//! use renderfleet_core::orchestration::{JobOrchestrator, StaticCompositionResolver};
//! use renderfleet_core::storage::{MemoryBackend, StorageManager};
//!
//! # async fn example(worker: Arc<dyn RenderWorker>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RenderFleetConfig::default();
//! let storage = Arc::new(StorageManager::new(
//!     Arc::new(MemoryBackend::new()),
//!     config.storage.clone(),
//! ));
//! let fleet = Arc::new(FleetManager::new(
//!     Arc::new(InProcessSubstrate::new(worker)),
//!     config.fleet.clone(),
//!     config.timeouts.invocation_timeout(),
//! ));
//! let revision = fleet
//!     .deploy(ArtifactRef::new("worker", "1.0.0"), Region::new("us-east-1"), 2048, 120)
//!     .await?;
//! let handle = FleetHandle::new(Arc::clone(&fleet), revision.revision_id)?;
//!
//! let resolver = Arc::new(StaticCompositionResolver::new().register("intro", Some(300)));
//! let orchestrator = JobOrchestrator::builder(config, storage, resolver).build();
//! let job_id = orchestrator
//!     .submit(JobSpec::new("intro", 300, 30, Codec::H264), &handle)
//!     .await?;
//! let status = orchestrator.status(&job_id).await?;
//! println!("{job_id}: {} ({:.1}%)", status.status, status.percent);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod download;
pub mod error;
pub mod events;
pub mod fleet;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod pricing;
pub mod state_machine;
pub mod storage;

#[cfg(feature = "web-api")]
pub mod web;

pub use config::{ConfigManager, RenderFleetConfig};
pub use download::DownloadBehavior;
pub use error::{RenderError, RenderResult};
pub use events::EventPublisher;
pub use fleet::{FleetHandle, FleetManager};
pub use models::{Codec, CodecParams, FailureReason, JobId, JobSpec, Region};
pub use orchestration::{JobOrchestrator, JobStatusReport};
pub use state_machine::{ChunkState, JobState};
pub use storage::StorageManager;
