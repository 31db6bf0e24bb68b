//! # Dispatcher
//!
//! Bounded-concurrency fan-out of chunk invocations for one job.
//!
//! Invocations run as independent tasks and report back over a single
//! completion channel; the dispatch loop is the only consumer and the only
//! place that decides what happens next (record, retry, fail, stop).
//! Each invocation task appends its own audit entry before reporting, so
//! attempts still in flight when dispatch stops are billed all the same.
//!
//! ```text
//!   ready queue ──launch──▶ invocation task ──Finished──▶ completion channel
//!        ▲                                                      │
//!        └──────── RetryReady (after backoff) ◀── transient ────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff_calculator::BackoffCalculator;
use super::error_classifier::{ErrorClassification, ErrorClassifier, ErrorContext};
use super::progress_tracker::{ChunkOutcome, InvocationRecord, ProgressTracker, RecordResult};
use crate::constants::events;
use crate::error::{RenderError, RenderResult};
use crate::events::EventPublisher;
use crate::fleet::{FleetHandle, WorkerOutcome, WorkerPayload};
use crate::logging::log_chunk_operation;
use crate::models::{Chunk, CodecParams, FailureReason, JobId};
use crate::storage::{keys, BucketHandle};

/// Everything the dispatcher needs to render one job
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job_id: JobId,
    /// Planned chunks; `chunks[i].index == i`
    pub chunks: Vec<Chunk>,
    pub codec: CodecParams,
    /// Bucket workers write their segments to
    pub bucket: String,
    pub max_concurrency: usize,
    /// Progress is persisted here after every invocation result
    pub progress_bucket: Option<BucketHandle>,
    /// Cloned into every invocation task; the paired receiver yields `None`
    /// once all of them have returned
    pub settled: Option<mpsc::Sender<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchOutcome {
    AllRendered,
    ChunkFailed {
        chunk_index: u32,
        reason: FailureReason,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    /// Invocation attempts started, retries included
    pub invocations: u64,
    pub retries: u64,
}

enum Completion {
    Running {
        index: u32,
    },
    Finished {
        index: u32,
        attempt: u32,
        result: RenderResult<WorkerOutcome>,
        duration_ms: u64,
    },
    RetryReady {
        index: u32,
    },
}

/// What to do after handling one completion
enum Step {
    Continue,
    Done(DispatchOutcome),
}

pub struct Dispatcher {
    tracker: Arc<ProgressTracker>,
    backoff: BackoffCalculator,
    classifier: Arc<dyn ErrorClassifier>,
    events: Arc<EventPublisher>,
    max_retries: u32,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_retries", &self.max_retries)
            .field("classifier", &self.classifier.classifier_name())
            .finish()
    }
}

/// Per-call loop state
struct DispatchRun<'a> {
    dispatcher: &'a Dispatcher,
    request: &'a DispatchRequest,
    fleet: &'a FleetHandle,
    tx: mpsc::UnboundedSender<Completion>,
    ready: VecDeque<u32>,
    in_flight: usize,
    remaining: usize,
    invocations: u64,
    retries: u64,
    started: Option<oneshot::Sender<()>>,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        backoff: BackoffCalculator,
        classifier: Arc<dyn ErrorClassifier>,
        events: Arc<EventPublisher>,
        max_retries: u32,
    ) -> Self {
        Self {
            tracker,
            backoff,
            classifier,
            events,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Render every chunk of a job with at most `max_concurrency` invocations
    /// in flight.
    ///
    /// Returns once all chunks are rendered, one chunk fails for good, or
    /// `cancel` fires. Cancellation stops new invocations only; in-flight ones
    /// finish on their own and their results are dropped. `started` fires on
    /// the first invocation.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        fleet: &FleetHandle,
        cancel: CancellationToken,
        started: Option<oneshot::Sender<()>>,
    ) -> RenderResult<DispatchReport> {
        if request.max_concurrency == 0 {
            return Err(RenderError::invalid_spec("max concurrency must be at least 1"));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut run = DispatchRun {
            dispatcher: self,
            request: &request,
            fleet,
            tx,
            ready: request.chunks.iter().map(|chunk| chunk.index).collect(),
            in_flight: 0,
            remaining: request.chunks.len(),
            invocations: 0,
            retries: 0,
            started,
        };

        info!(
            job_id = %request.job_id,
            chunks = request.chunks.len(),
            max_concurrency = request.max_concurrency,
            revision_id = %fleet.revision_id(),
            "Dispatching job"
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                break DispatchOutcome::Cancelled;
            }
            if let Step::Done(outcome) = run.fill_slots()? {
                break outcome;
            }
            if run.remaining == 0 {
                break DispatchOutcome::AllRendered;
            }

            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => break DispatchOutcome::Cancelled,
                completion = rx.recv() => completion,
            };
            // The loop holds a sender, so the channel cannot close
            let Some(completion) = completion else {
                return Err(RenderError::Internal("completion channel closed".into()));
            };

            let finished = matches!(completion, Completion::Finished { .. });
            let step = run.handle(completion, &cancel)?;
            if finished {
                self.persist_progress(&request).await;
            }
            if let Step::Done(outcome) = step {
                break outcome;
            }
        };

        info!(
            job_id = %request.job_id,
            outcome = ?outcome,
            invocations = run.invocations,
            retries = run.retries,
            still_in_flight = run.in_flight,
            "Dispatch finished"
        );

        Ok(DispatchReport {
            outcome,
            invocations: run.invocations,
            retries: run.retries,
        })
    }

    async fn persist_progress(&self, request: &DispatchRequest) {
        let Some(bucket) = &request.progress_bucket else {
            return;
        };
        if let Err(e) = self.tracker.persist(&request.job_id, bucket).await {
            warn!(job_id = %request.job_id, error = %e, "Failed to persist progress record");
        }
    }

    fn emit(&self, name: &str, job_id: &JobId, context: serde_json::Value) {
        if let Err(e) = self.events.publish(name, job_id.as_str(), context) {
            warn!(job_id = %job_id, event = name, error = %e, "Failed to publish event");
        }
    }
}

impl DispatchRun<'_> {
    fn job_id(&self) -> &JobId {
        &self.request.job_id
    }

    /// A write was refused because the job was sealed by cancel or timeout
    fn sealed(&self) -> bool {
        self.dispatcher
            .tracker
            .is_sealed(self.job_id())
            .unwrap_or(true)
    }

    fn fill_slots(&mut self) -> RenderResult<Step> {
        while self.in_flight < self.request.max_concurrency {
            let Some(index) = self.ready.pop_front() else {
                break;
            };
            if let Step::Done(outcome) = self.launch(index)? {
                return Ok(Step::Done(outcome));
            }
        }
        Ok(Step::Continue)
    }

    fn launch(&mut self, index: u32) -> RenderResult<Step> {
        let job_id = self.job_id().clone();
        let attempt = match self.dispatcher.tracker.record_invocation(&job_id, index) {
            Ok(attempt) => attempt,
            Err(RenderError::StaleUpdate { .. }) if self.sealed() => {
                return Ok(Step::Done(DispatchOutcome::Cancelled))
            }
            Err(e) => return Err(e),
        };
        let chunk = &self.request.chunks[index as usize];

        let payload = WorkerPayload {
            job_id: job_id.clone(),
            chunk_index: index,
            frame_start: chunk.frames.start,
            frame_end: chunk.frames.end,
            codec_params: self.request.codec.clone(),
            bucket: self.request.bucket.clone(),
            output_key: keys::chunk_key(&job_id, index),
            attempt,
        };

        self.in_flight += 1;
        self.invocations += 1;
        log_chunk_operation("invoke", job_id.as_str(), index, attempt, "invoked", None);
        self.dispatcher.emit(
            events::CHUNK_INVOKED,
            &job_id,
            json!({ "chunk_index": index, "attempt": attempt }),
        );
        if let Some(started) = self.started.take() {
            let _ = started.send(());
        }

        let fleet = self.fleet.clone();
        let tx = self.tx.clone();
        let tracker = Arc::clone(&self.dispatcher.tracker);
        let settled = self.request.settled.clone();
        tokio::spawn(async move {
            let _settled = settled;
            let _ = tx.send(Completion::Running { index });
            let begin = Instant::now();
            let result = fleet.invoke(payload).await;
            let duration_ms = begin.elapsed().as_millis() as u64;
            if let Err(e) = audit_attempt(&tracker, &job_id, index, attempt, &result, duration_ms) {
                debug!(job_id = %job_id, chunk_index = index, error = %e, "Invocation audit dropped");
            }
            let _ = tx.send(Completion::Finished {
                index,
                attempt,
                result,
                duration_ms,
            });
        });

        Ok(Step::Continue)
    }

    fn handle(&mut self, completion: Completion, cancel: &CancellationToken) -> RenderResult<Step> {
        match completion {
            Completion::Running { index } => {
                if let Err(e) = self.dispatcher.tracker.mark_rendering(self.job_id(), index) {
                    debug!(job_id = %self.job_id(), chunk_index = index, error = %e, "Progress ping ignored");
                }
                Ok(Step::Continue)
            }
            Completion::RetryReady { index } => {
                self.ready.push_back(index);
                Ok(Step::Continue)
            }
            Completion::Finished {
                index,
                attempt,
                result,
                duration_ms,
            } => {
                self.in_flight -= 1;
                debug!(
                    job_id = %self.job_id(),
                    chunk_index = index,
                    attempt = attempt,
                    duration_ms = duration_ms,
                    "Invocation returned"
                );

                if cancel.is_cancelled() {
                    self.discard(index, attempt, "job cancelled");
                    return Ok(Step::Done(DispatchOutcome::Cancelled));
                }

                match result {
                    Ok(WorkerOutcome::Success(response)) => self.on_success(index, attempt, response),
                    Ok(WorkerOutcome::Transient(failure)) => {
                        let classification = self.dispatcher.classifier.classify_failure(
                            &failure,
                            false,
                            &self.context(index, attempt),
                        );
                        self.on_failure(index, attempt, classification)
                    }
                    Ok(WorkerOutcome::Permanent(failure)) => {
                        let classification = self.dispatcher.classifier.classify_failure(
                            &failure,
                            true,
                            &self.context(index, attempt),
                        );
                        self.on_failure(index, attempt, classification)
                    }
                    Err(error) => {
                        let classification = self
                            .dispatcher
                            .classifier
                            .classify_error(&error, &self.context(index, attempt));
                        self.on_failure(index, attempt, classification)
                    }
                }
            }
        }
    }

    fn context(&self, index: u32, attempt: u32) -> ErrorContext {
        ErrorContext {
            job_id: self.job_id().to_string(),
            chunk_index: index,
            attempt_number: attempt,
            max_attempts: self.dispatcher.max_retries + 1,
        }
    }

    fn discard(&self, index: u32, attempt: u32, reason: &str) {
        log_chunk_operation(
            "record_result",
            self.job_id().as_str(),
            index,
            attempt,
            "discarded",
            Some(reason),
        );
        self.dispatcher.emit(
            events::CHUNK_RESULT_DISCARDED,
            self.job_id(),
            json!({ "chunk_index": index, "attempt": attempt, "reason": reason }),
        );
    }

    fn on_success(
        &mut self,
        index: u32,
        attempt: u32,
        response: crate::fleet::WorkerResponse,
    ) -> RenderResult<Step> {
        let render_time_ms = response.render_time_ms;
        let outcome = ChunkOutcome::Rendered {
            output_key: response.output_key,
            frames_rendered: response.frames_rendered,
            render_time_ms,
        };

        match self
            .dispatcher
            .tracker
            .record_chunk_result(self.job_id(), index, outcome)
        {
            Ok(RecordResult::Applied) | Ok(RecordResult::Unchanged) => {
                self.remaining -= 1;
                log_chunk_operation("record_result", self.job_id().as_str(), index, attempt, "rendered", None);
                self.dispatcher.emit(
                    events::CHUNK_RENDERED,
                    self.job_id(),
                    json!({ "chunk_index": index, "attempt": attempt, "render_time_ms": render_time_ms }),
                );
                Ok(Step::Continue)
            }
            Err(e @ RenderError::StaleUpdate { .. }) => {
                self.discard(index, attempt, &e.to_string());
                if self.sealed() {
                    Ok(Step::Done(DispatchOutcome::Cancelled))
                } else {
                    Ok(Step::Continue)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn on_failure(
        &mut self,
        index: u32,
        attempt: u32,
        classification: ErrorClassification,
    ) -> RenderResult<Step> {
        let job_id = self.job_id().clone();
        let error = classification.error_message.clone();

        if classification.is_retryable {
            let retry = match self.dispatcher.tracker.requeue_chunk(&job_id, index, &error) {
                Ok(retry) => retry,
                Err(RenderError::StaleUpdate { .. }) if self.sealed() => {
                    return Ok(Step::Done(DispatchOutcome::Cancelled))
                }
                Err(e) => return Err(e),
            };
            self.retries += 1;
            let delay = self.dispatcher.backoff.delay_for_retry(retry);

            log_chunk_operation(
                "retry",
                job_id.as_str(),
                index,
                attempt,
                "requeued",
                Some(&classification.error_code),
            );
            self.dispatcher.emit(
                events::CHUNK_RETRY_SCHEDULED,
                &job_id,
                json!({
                    "chunk_index": index,
                    "attempt": attempt,
                    "retry": retry,
                    "delay_ms": delay.as_millis() as u64,
                    "category": classification.error_category,
                }),
            );

            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Completion::RetryReady { index });
            });
            return Ok(Step::Continue);
        }

        match self.dispatcher.tracker.record_chunk_result(
            &job_id,
            index,
            ChunkOutcome::Failed {
                error: error.clone(),
            },
        ) {
            Ok(_) => {}
            Err(RenderError::StaleUpdate { .. }) if self.sealed() => {
                return Ok(Step::Done(DispatchOutcome::Cancelled))
            }
            Err(e) => return Err(e),
        }

        let reason = if classification.error_category.is_transient() {
            FailureReason::RetriesExhausted {
                chunk_index: index,
                attempts: attempt,
                error,
            }
        } else {
            FailureReason::ChunkFailed {
                chunk_index: index,
                error,
            }
        };

        warn!(
            job_id = %job_id,
            chunk_index = index,
            attempt = attempt,
            category = %classification.error_category,
            reason = %reason,
            "Chunk failed permanently"
        );
        self.dispatcher.emit(
            events::CHUNK_FAILED,
            &job_id,
            json!({ "chunk_index": index, "attempt": attempt, "reason": reason }),
        );

        Ok(Step::Done(DispatchOutcome::ChunkFailed {
            chunk_index: index,
            reason,
        }))
    }
}

/// Append one attempt to the job's audit log, whatever became of its result
fn audit_attempt(
    tracker: &ProgressTracker,
    job_id: &JobId,
    index: u32,
    attempt: u32,
    result: &RenderResult<WorkerOutcome>,
    duration_ms: u64,
) -> RenderResult<()> {
    let (outcome, error) = match result {
        Ok(WorkerOutcome::Success(_)) => ("success", None),
        Ok(WorkerOutcome::Transient(failure)) => ("transient", Some(failure.to_string())),
        Ok(WorkerOutcome::Permanent(failure)) => ("permanent", Some(failure.to_string())),
        Err(error) => ("error", Some(error.to_string())),
    };
    tracker.record_invocation_outcome(
        job_id,
        InvocationRecord {
            chunk_index: index,
            attempt,
            outcome: outcome.to_string(),
            error,
            duration_ms,
            recorded_at: Utc::now(),
        },
    )
}
