//! # Job Orchestrator
//!
//! Top-level coordinator: validates a submission, plans chunks, provisions
//! the bucket, then drives dispatch and stitching on a background task.
//!
//! Each job has one state machine behind its own lock, its own cancellation
//! token and its own progress record, so jobs never share mutable state.
//! Status transitions are checkpointed to `job/{id}/status.json` and chunk
//! progress to `job/{id}/progress.json`, so that a fresh orchestrator can
//! still answer status for jobs it never ran. Finished jobs are dropped from
//! memory after `progress.retain_terminal_seconds`; the checkpoint answers
//! for them from then on.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff_calculator::BackoffCalculator;
use super::composition::CompositionResolver;
use super::dispatcher::{DispatchOutcome, DispatchRequest, Dispatcher};
use super::error_classifier::{ErrorClassifier, StandardErrorClassifier};
use super::progress_tracker::{PersistedProgress, ProgressSnapshot, ProgressTracker};
use super::stitcher::{ConcatMerger, SegmentMerger, StitchTarget, Stitcher};
use crate::config::RenderFleetConfig;
use crate::constants::{events, system::IN_FLIGHT_SETTLE_GRACE_MS};
use crate::error::{RenderError, RenderResult};
use crate::events::EventPublisher;
use crate::fleet::{FleetHandle, RevisionLease};
use crate::logging::{log_error, log_job_operation};
use crate::models::{
    plan_chunks, FailureReason, JobId, JobRecord, JobSpec, OutputArtifact, Region,
};
use crate::pricing::{CostEstimate, PricingTable};
use crate::state_machine::{JobEvent, JobState, JobStateMachine};
use crate::storage::{keys, BucketHandle, StorageManager};

/// Answer to a status poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub status: JobState,
    pub percent: f64,
    pub rendered_count: u32,
    pub failed_count: u32,
    pub pending_count: u32,
    pub total_count: u32,
    pub estimated_seconds_remaining: Option<f64>,
    pub output_url: Option<String>,
    pub output_key: Option<String>,
    pub output_size: Option<u64>,
    pub failure_reason: Option<FailureReason>,
    pub invocations: u64,
    pub estimated_cost: Option<CostEstimate>,
    pub revision_id: String,
    pub region: Region,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusReport {
    /// Replace the counters with those of a newer progress record
    fn apply_progress(&mut self, progress: &ProgressSnapshot) {
        self.percent = progress.percent;
        self.rendered_count = progress.rendered_count;
        self.failed_count = progress.failed_count;
        self.pending_count = progress.pending_count;
        self.total_count = progress.total_count;
        self.estimated_seconds_remaining = progress.estimated_seconds_remaining;
        self.invocations = progress.invocations;
    }
}

struct JobSlot {
    record: JobRecord,
    machine: JobStateMachine,
}

struct JobEntry {
    slot: Mutex<JobSlot>,
    cancel: CancellationToken,
    bucket: BucketHandle,
    lease: Mutex<Option<RevisionLease>>,
    /// Orders status checkpoint writes
    checkpoint_lock: tokio::sync::Mutex<()>,
}

/// How the drive task ended, before job-level bookkeeping
enum JobRun {
    Done,
    Failed(FailureReason),
    /// Someone else already moved the job to a terminal state
    Superseded,
}

struct OrchestratorCore {
    config: RenderFleetConfig,
    storage: Arc<StorageManager>,
    tracker: Arc<ProgressTracker>,
    dispatcher: Dispatcher,
    stitcher: Stitcher,
    resolver: Arc<dyn CompositionResolver>,
    pricing: PricingTable,
    events: Arc<EventPublisher>,
    jobs: DashMap<JobId, Arc<JobEntry>>,
}

/// Assembles a [`JobOrchestrator`]; everything except storage and the
/// composition resolver has a default
pub struct OrchestratorBuilder {
    config: RenderFleetConfig,
    storage: Arc<StorageManager>,
    resolver: Arc<dyn CompositionResolver>,
    merger: Arc<dyn SegmentMerger>,
    classifier: Arc<dyn ErrorClassifier>,
    events: Option<Arc<EventPublisher>>,
    pricing: Option<PricingTable>,
}

impl OrchestratorBuilder {
    pub fn merger(mut self, merger: Arc<dyn SegmentMerger>) -> Self {
        self.merger = merger;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn events(mut self, events: Arc<EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn build(self) -> JobOrchestrator {
        let config = self.config;
        let tracker = Arc::new(ProgressTracker::new(config.progress.moving_average_window));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventPublisher::new(config.events.channel_capacity)));
        let dispatcher = Dispatcher::new(
            Arc::clone(&tracker),
            BackoffCalculator::new(config.backoff.clone()),
            self.classifier,
            Arc::clone(&events),
            config.dispatch.max_retries,
        );
        let stitcher = Stitcher::new(Arc::clone(&tracker), self.merger, config.stitch.clone());
        let pricing = self
            .pricing
            .unwrap_or_else(|| PricingTable::builtin(&config.pricing));

        JobOrchestrator {
            core: Arc::new(OrchestratorCore {
                config,
                storage: self.storage,
                tracker,
                dispatcher,
                stitcher,
                resolver: self.resolver,
                pricing,
                events,
                jobs: DashMap::new(),
            }),
        }
    }
}

/// Cheap-to-clone handle; clones share all job state
#[derive(Clone)]
pub struct JobOrchestrator {
    core: Arc<OrchestratorCore>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("jobs", &self.core.jobs.len())
            .finish()
    }
}

impl JobOrchestrator {
    pub fn builder(
        config: RenderFleetConfig,
        storage: Arc<StorageManager>,
        resolver: Arc<dyn CompositionResolver>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            storage,
            resolver,
            merger: Arc::new(ConcatMerger),
            classifier: Arc::new(StandardErrorClassifier::new()),
            events: None,
            pricing: None,
        }
    }

    pub fn events(&self) -> &Arc<EventPublisher> {
        &self.core.events
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.core.tracker
    }

    pub fn config(&self) -> &RenderFleetConfig {
        &self.core.config
    }

    /// Jobs held in memory by this instance, finished ones included until
    /// they are evicted
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.core.jobs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Validate, plan and start a job. Returns without waiting for it.
    pub async fn submit(&self, spec: JobSpec, fleet: &FleetHandle) -> RenderResult<JobId> {
        let core = &self.core;
        spec.validate()?;

        let job_id = match &spec.job_id {
            Some(raw) => JobId::parse(raw.clone())?,
            None => JobId::generate(),
        };
        if core.jobs.contains_key(&job_id)
            || core.tracker.contains(&job_id)
            || core.load_checkpoint(&job_id).await?.is_some()
        {
            return Err(RenderError::invalid_spec(format!("job {job_id} already exists")));
        }

        let region = spec
            .region
            .clone()
            .unwrap_or_else(|| core.storage.default_region());
        let revision = fleet.revision()?;
        if revision.region != region {
            return Err(RenderError::invalid_spec(format!(
                "revision {} is deployed in {}, job targets {region}",
                revision.revision_id, revision.region
            )));
        }

        let frame_count = spec.frame_count as u64;
        let chunk_size = spec.chunk_size as u64;
        let composition = core.resolver.resolve(&spec.composition, &region).await?;
        if let Some(available) = composition.duration_in_frames {
            if frame_count > available {
                return Err(RenderError::invalid_spec(format!(
                    "composition {} has {available} frames, job requests {frame_count}",
                    composition.reference
                )));
            }
        }
        let chunks = plan_chunks(&job_id, frame_count, chunk_size)?;

        let bucket = core.storage.ensure_bucket(&region).await?;
        let lease = fleet.acquire_lease()?;
        core.tracker.init_job(&job_id, chunks.clone())?;

        let now = Utc::now();
        let record = JobRecord {
            job_id: job_id.clone(),
            composition: spec.composition.clone(),
            frame_count,
            chunk_size,
            codec: spec.codec.clone(),
            region: region.clone(),
            download: spec.download.clone(),
            revision_id: revision.revision_id.clone(),
            memory_mb: revision.memory_mb,
            bucket: bucket.name().to_string(),
            chunks: chunks.iter().map(|chunk| chunk.id()).collect(),
            output_key: None,
            output_size: None,
            created_at: now,
            updated_at: now,
        };
        let entry = Arc::new(JobEntry {
            slot: Mutex::new(JobSlot {
                record,
                machine: JobStateMachine::new(job_id.clone()),
            }),
            cancel: CancellationToken::new(),
            bucket: bucket.clone(),
            lease: Mutex::new(Some(lease)),
            checkpoint_lock: tokio::sync::Mutex::new(()),
        });
        core.jobs.insert(job_id.clone(), Arc::clone(&entry));

        let request = DispatchRequest {
            job_id: job_id.clone(),
            chunks,
            codec: spec.codec.clone(),
            bucket: bucket.name().to_string(),
            max_concurrency: spec
                .max_concurrency
                .unwrap_or(core.config.dispatch.max_concurrency),
            progress_bucket: core
                .config
                .storage
                .checkpoint_status
                .then(|| bucket.clone()),
            settled: None,
        };
        let timeout = spec
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| core.config.timeouts.job_timeout());

        log_job_operation(
            "submit",
            job_id.as_str(),
            "pending",
            Some(&format!(
                "{} chunks over {frame_count} frames in {region}",
                request.chunks.len()
            )),
        );
        core.publish(
            events::JOB_SUBMITTED,
            &job_id,
            json!({
                "chunks": request.chunks.len(),
                "frame_count": frame_count,
                "region": region,
                "revision_id": revision.revision_id,
            }),
        );
        core.checkpoint(&job_id, &entry).await;

        tokio::spawn(Arc::clone(core).drive(entry, fleet.clone(), request, timeout));
        Ok(job_id)
    }

    /// Aggregated progress for a job
    pub async fn status(&self, job_id: &JobId) -> RenderResult<JobStatusReport> {
        if let Some(entry) = self.core.entry(job_id) {
            return self.core.report(job_id, &entry);
        }
        self.core
            .load_checkpoint(job_id)
            .await?
            .ok_or_else(|| RenderError::not_found(format!("job {job_id}")))
    }

    /// Fail the job with `Cancelled` and stop issuing invocations.
    ///
    /// In-flight invocations are left to finish; their results are dropped
    /// and, with `cancellation.delete_partial_output`, their segments are
    /// removed once the last of them returns.
    pub async fn cancel(&self, job_id: &JobId) -> RenderResult<JobStatusReport> {
        let core = &self.core;
        let Some(entry) = core.entry(job_id) else {
            return match core.load_checkpoint(job_id).await? {
                Some(report) => Err(RenderError::InvalidState(format!(
                    "job {job_id} is not running here (status {})",
                    report.status
                ))),
                None => Err(RenderError::not_found(format!("job {job_id}"))),
            };
        };

        core.transition(job_id, &entry, JobEvent::Fail(FailureReason::Cancelled))
            .await?;
        entry.cancel.cancel();

        core.report(job_id, &entry)
    }

    /// Poll until the job is terminal
    pub async fn wait_for_terminal(
        &self,
        job_id: &JobId,
        poll_interval: Duration,
    ) -> RenderResult<JobStatusReport> {
        loop {
            let report = self.status(job_id).await?;
            if report.status.is_terminal() {
                return Ok(report);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl OrchestratorCore {
    fn entry(&self, job_id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(job_id).map(|entry| Arc::clone(entry.value()))
    }

    fn publish(&self, name: &str, job_id: &JobId, context: serde_json::Value) {
        if let Err(e) = self.events.publish(name, job_id.as_str(), context) {
            warn!(job_id = %job_id, event = name, error = %e, "Failed to publish event");
        }
    }

    /// Background task owning one job from dispatch to a terminal state
    async fn drive(
        self: Arc<Self>,
        entry: Arc<JobEntry>,
        fleet: FleetHandle,
        mut request: DispatchRequest,
        timeout: Duration,
    ) {
        let job_id = request.job_id.clone();
        let (started_tx, started_rx) = oneshot::channel();
        let (settled_tx, mut settled_rx) = mpsc::channel::<()>(1);
        request.settled = Some(settled_tx);

        let watcher_core = Arc::clone(&self);
        let watcher_entry = Arc::clone(&entry);
        let watcher_job = job_id.clone();
        tokio::spawn(async move {
            if started_rx.await.is_ok() {
                watcher_core.start_if_pending(&watcher_job, &watcher_entry).await;
            }
        });

        let run = tokio::time::timeout(
            timeout,
            self.run(&job_id, &entry, &fleet, request, started_tx),
        )
        .await;

        match run {
            Ok(Ok(JobRun::Done)) | Ok(Ok(JobRun::Superseded)) => {}
            Ok(Ok(JobRun::Failed(reason))) => {
                self.finish_failed(&job_id, &entry, reason).await;
            }
            Ok(Err(e)) => {
                log_error("job_orchestrator", "drive", &e.to_string(), Some(job_id.as_str()));
                self.finish_failed(
                    &job_id,
                    &entry,
                    FailureReason::Internal {
                        error: e.to_string(),
                    },
                )
                .await;
            }
            Err(_) => {
                warn!(job_id = %job_id, timeout_seconds = timeout.as_secs(), "Job exceeded its wall-clock budget");
                entry.cancel.cancel();
                if let Err(e) = self.transition(&job_id, &entry, JobEvent::TimeOut).await {
                    debug!(job_id = %job_id, error = %e, "Timed out job was already terminal");
                }
            }
        }
        entry.cancel.cancel();

        // Segments and audit entries keep arriving until every invocation returns
        let settle = fleet.manager().invocation_timeout()
            + Duration::from_millis(IN_FLIGHT_SETTLE_GRACE_MS);
        if tokio::time::timeout(settle, settled_rx.recv()).await.is_err() {
            warn!(job_id = %job_id, "Invocations still running past the settle deadline");
        }

        self.finalize(&job_id, &entry).await;
    }

    /// Cleanup and final checkpoint once no invocation can touch the job
    async fn finalize(self: &Arc<Self>, job_id: &JobId, entry: &JobEntry) {
        let state = entry.slot.lock().machine.current_state();
        if !state.is_terminal() {
            warn!(job_id = %job_id, state = %state, "Job ended its run without a terminal status");
            return;
        }

        if matches!(state, JobState::Failed | JobState::TimedOut)
            && self.config.cancellation.delete_partial_output
        {
            self.delete_partial_output(job_id, entry).await;
        }
        if self.config.storage.checkpoint_status {
            if let Err(e) = self.tracker.persist(job_id, &entry.bucket).await {
                warn!(job_id = %job_id, error = %e, "Failed to persist final progress record");
            }
            self.checkpoint(job_id, entry).await;
        }

        self.schedule_eviction(job_id.clone());
    }

    fn schedule_eviction(self: &Arc<Self>, job_id: JobId) {
        let core: Weak<Self> = Arc::downgrade(self);
        let retention = self.config.progress.terminal_retention();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(core) = core.upgrade() {
                core.jobs.remove(&job_id);
                core.tracker.remove(&job_id);
                debug!(job_id = %job_id, "Evicted finished job from memory");
            }
        });
    }

    async fn run(
        &self,
        job_id: &JobId,
        entry: &JobEntry,
        fleet: &FleetHandle,
        request: DispatchRequest,
        started: oneshot::Sender<()>,
    ) -> RenderResult<JobRun> {
        let report = self
            .dispatcher
            .dispatch(request, fleet, entry.cancel.clone(), Some(started))
            .await?;

        match report.outcome {
            DispatchOutcome::Cancelled => return Ok(JobRun::Superseded),
            DispatchOutcome::ChunkFailed { reason, .. } => return Ok(JobRun::Failed(reason)),
            DispatchOutcome::AllRendered => {}
        }

        self.start_if_pending(job_id, entry).await;
        if !self.try_transition(job_id, entry, JobEvent::BeginStitch).await? {
            return Ok(JobRun::Superseded);
        }

        let (codec, download) = {
            let slot = entry.slot.lock();
            (slot.record.codec.clone(), slot.record.download.clone())
        };
        let stitched = self
            .stitcher
            .stitch(StitchTarget {
                job_id,
                bucket: &entry.bucket,
                codec: &codec,
                download: download.as_ref(),
            })
            .await;

        let artifact = match stitched {
            Ok(artifact) => artifact,
            Err(RenderError::StitchFailure {
                attempts, reason, ..
            }) => {
                return Ok(JobRun::Failed(FailureReason::StitchFailure {
                    attempts,
                    error: reason,
                }))
            }
            Err(e) => return Err(e),
        };

        self.record_output(entry, &artifact);
        if self.try_transition(job_id, entry, JobEvent::Complete).await? {
            log_job_operation(
                "finalize",
                job_id.as_str(),
                "done",
                Some(&format!("{} bytes at {}", artifact.size_bytes, artifact.key)),
            );
            Ok(JobRun::Done)
        } else {
            // Cancelled while stitching; finalize removes the output
            Ok(JobRun::Superseded)
        }
    }

    fn record_output(&self, entry: &JobEntry, artifact: &OutputArtifact) {
        let mut slot = entry.slot.lock();
        slot.record.output_key = Some(artifact.key.clone());
        slot.record.output_size = Some(artifact.size_bytes);
        slot.record.updated_at = Utc::now();
    }

    async fn start_if_pending(&self, job_id: &JobId, entry: &JobEntry) {
        let pending = entry.slot.lock().machine.current_state() == JobState::Pending;
        if pending {
            if let Err(e) = self.try_transition(job_id, entry, JobEvent::Start).await {
                debug!(job_id = %job_id, error = %e, "Start transition skipped");
            }
        }
    }

    async fn finish_failed(&self, job_id: &JobId, entry: &JobEntry, reason: FailureReason) {
        if let Err(e) = self
            .try_transition(job_id, entry, JobEvent::Fail(reason))
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to record job failure");
        }
    }

    /// Like [`Self::transition`], but a job that is already terminal yields
    /// `Ok(false)` instead of an error
    async fn try_transition(
        &self,
        job_id: &JobId,
        entry: &JobEntry,
        event: JobEvent,
    ) -> RenderResult<bool> {
        match self.transition(job_id, entry, event).await {
            Ok(_) => Ok(true),
            Err(RenderError::InvalidState(message)) => {
                debug!(job_id = %job_id, reason = %message, "Transition skipped");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a job event, then checkpoint and publish. Terminal states seal
    /// the progress record and release the revision lease.
    async fn transition(
        &self,
        job_id: &JobId,
        entry: &JobEntry,
        event: JobEvent,
    ) -> RenderResult<JobState> {
        let event_name = match &event {
            JobEvent::Start => events::JOB_STARTED,
            JobEvent::BeginStitch => events::JOB_STITCHING,
            JobEvent::Complete => events::JOB_COMPLETED,
            JobEvent::Fail(FailureReason::Cancelled) => events::JOB_CANCELLED,
            JobEvent::Fail(_) => events::JOB_FAILED,
            JobEvent::TimeOut => events::JOB_TIMED_OUT,
        };
        let reason = event.failure_reason().cloned();

        let (from, to) = self.apply_event(job_id, entry, event)?;
        if to.is_terminal() {
            entry.lease.lock().take();
        }

        log_job_operation(
            "transition",
            job_id.as_str(),
            &to.to_string(),
            reason.as_ref().map(ToString::to_string).as_deref(),
        );
        self.publish(
            event_name,
            job_id,
            json!({ "from": from, "to": to, "reason": reason }),
        );
        self.checkpoint(job_id, entry).await;
        Ok(to)
    }

    /// Move the state machine. A terminal state seals the progress record
    /// before the slot lock is released, so no chunk result can be committed
    /// once the job is terminal.
    fn apply_event(
        &self,
        job_id: &JobId,
        entry: &JobEntry,
        event: JobEvent,
    ) -> RenderResult<(JobState, JobState)> {
        let mut slot = entry.slot.lock();
        let from = slot.machine.current_state();
        let to = slot.machine.transition(event)?;
        slot.record.updated_at = Utc::now();
        if to.is_terminal() {
            if let Err(e) = self.tracker.seal(job_id) {
                warn!(job_id = %job_id, error = %e, "Could not seal progress record");
            }
        }
        Ok((from, to))
    }

    fn report(&self, job_id: &JobId, entry: &JobEntry) -> RenderResult<JobStatusReport> {
        let progress = self.tracker.read_progress(job_id)?;
        let slot = entry.slot.lock();
        let record = &slot.record;

        let estimated_cost = if progress.invocations == 0 {
            None
        } else {
            self.pricing
                .estimate(
                    progress.invocations,
                    record.memory_mb,
                    progress.billed_duration_ms / progress.invocations,
                    &record.region,
                )
                .ok()
        };

        Ok(JobStatusReport {
            job_id: job_id.clone(),
            status: slot.machine.current_state(),
            percent: progress.percent,
            rendered_count: progress.rendered_count,
            failed_count: progress.failed_count,
            pending_count: progress.pending_count,
            total_count: progress.total_count,
            estimated_seconds_remaining: progress.estimated_seconds_remaining,
            output_url: record
                .output_key
                .as_ref()
                .map(|key| format!("storage://{}/{key}", record.bucket)),
            output_key: record.output_key.clone(),
            output_size: record.output_size,
            failure_reason: slot.machine.failure_reason().cloned(),
            invocations: progress.invocations,
            estimated_cost,
            revision_id: record.revision_id.clone(),
            region: record.region.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    async fn checkpoint(&self, job_id: &JobId, entry: &JobEntry) {
        if !self.config.storage.checkpoint_status {
            return;
        }
        // Build under the lock so the last write carries the newest state
        let _ordered = entry.checkpoint_lock.lock().await;
        let body = match self
            .report(job_id, entry)
            .and_then(|report| Ok(serde_json::to_vec(&report)?))
        {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Could not build status checkpoint");
                return;
            }
        };
        if let Err(e) = entry
            .bucket
            .put(&keys::status_key(job_id), body.into())
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to write status checkpoint");
        }
    }

    /// Status checkpoint left in the default region's bucket, if any, with
    /// counters taken from the persisted progress record
    async fn load_checkpoint(&self, job_id: &JobId) -> RenderResult<Option<JobStatusReport>> {
        let Some(bucket) = self
            .storage
            .find_bucket(&self.storage.default_region())
            .await?
        else {
            return Ok(None);
        };
        let mut report: JobStatusReport = match bucket.get(&keys::status_key(job_id)).await {
            Ok(body) => serde_json::from_slice(&body)?,
            Err(RenderError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if let Some(progress) = PersistedProgress::load(&bucket, job_id).await? {
            report.apply_progress(&progress.snapshot());
        }
        Ok(Some(report))
    }

    /// Remove the segments and output a failed, cancelled or timed-out job
    /// left behind
    async fn delete_partial_output(&self, job_id: &JobId, entry: &JobEntry) {
        let mut keys_to_delete = vec![keys::output_key(job_id)];
        match entry.bucket.list(&keys::chunk_prefix(job_id)).await {
            Ok(chunk_keys) => keys_to_delete.extend(chunk_keys),
            Err(e) => warn!(job_id = %job_id, error = %e, "Could not list chunk segments"),
        }

        for key in keys_to_delete {
            if let Err(e) = entry.bucket.delete(&key).await {
                warn!(job_id = %job_id, key = %key, error = %e, "Failed to delete partial output");
            }
        }

        let had_output = {
            let mut slot = entry.slot.lock();
            slot.record.output_size = None;
            slot.record.output_key.take().is_some()
        };
        info!(job_id = %job_id, had_output = had_output, "Deleted partial output");
    }
}
