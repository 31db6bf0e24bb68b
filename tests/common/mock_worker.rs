//! Scripted render worker for driving the orchestrator end to end.
//!
//! Each chunk index can be given a queue of behaviours; once the queue runs
//! dry the worker succeeds. A successful render writes `[{index}]` to the
//! payload's output key so stitching order is visible in the final artifact.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use renderfleet_core::fleet::{
    FailureKind, RenderWorker, WorkerOutcome, WorkerPayload, WorkerResponse,
};
use renderfleet_core::storage::{ObjectAttributes, StorageBackend};

#[derive(Debug, Clone)]
pub enum MockStep {
    Succeed,
    Transient(FailureKind),
    Permanent(FailureKind),
    /// Sleep, then succeed; used to trip the invocation timeout
    Sleep(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockInvocation {
    pub chunk_index: u32,
    pub attempt: u32,
}

pub struct ScriptedWorker {
    backend: Arc<dyn StorageBackend>,
    scripts: Mutex<HashMap<u32, VecDeque<MockStep>>>,
    render_delay: Duration,
    gate: Option<Arc<Semaphore>>,
    invocations: Mutex<Vec<MockInvocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            scripts: Mutex::new(HashMap::new()),
            render_delay: Duration::from_millis(2),
            gate: None,
            invocations: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Every render waits for a permit before doing anything
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn script(self, chunk_index: u32, steps: Vec<MockStep>) -> Self {
        self.scripts.lock().insert(chunk_index, steps.into());
        self
    }

    pub fn invocations(&self) -> Vec<MockInvocation> {
        self.invocations.lock().clone()
    }

    pub fn attempts_for(&self, chunk_index: u32) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.chunk_index == chunk_index)
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, chunk_index: u32) -> MockStep {
        self.scripts
            .lock()
            .get_mut(&chunk_index)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockStep::Succeed)
    }

    async fn render_inner(&self, payload: WorkerPayload) -> WorkerOutcome {
        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    return WorkerOutcome::transient(FailureKind::Infrastructure, "gate closed")
                }
            }
        }

        match self.next_step(payload.chunk_index) {
            MockStep::Transient(kind) => {
                return WorkerOutcome::transient(kind, "scripted transient")
            }
            MockStep::Permanent(kind) => {
                return WorkerOutcome::permanent(kind, "scripted permanent")
            }
            MockStep::Sleep(duration) => tokio::time::sleep(duration).await,
            MockStep::Succeed => {}
        }

        tokio::time::sleep(self.render_delay).await;
        let segment = Bytes::from(format!("[{}]", payload.chunk_index));
        if let Err(e) = self
            .backend
            .put(
                &payload.bucket,
                &payload.output_key,
                segment,
                ObjectAttributes::default(),
            )
            .await
        {
            return WorkerOutcome::transient(FailureKind::Infrastructure, e.to_string());
        }

        WorkerOutcome::Success(WorkerResponse {
            output_key: payload.output_key,
            frames_rendered: payload.frame_end - payload.frame_start,
            render_time_ms: self.render_delay.as_millis() as u64,
        })
    }
}

#[async_trait]
impl RenderWorker for ScriptedWorker {
    async fn render(&self, payload: WorkerPayload) -> WorkerOutcome {
        self.invocations.lock().push(MockInvocation {
            chunk_index: payload.chunk_index,
            attempt: payload.attempt,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = self.render_inner(payload).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
