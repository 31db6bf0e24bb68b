use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::payload::{FailureKind, WorkerOutcome, WorkerPayload};
use super::substrate::ComputeSubstrate;
use crate::config::FleetConfig;
use crate::error::{RenderError, RenderResult};
use crate::models::{ArtifactRef, FleetRevision, Region};

#[derive(Debug)]
struct RevisionEntry {
    revision: FleetRevision,
    active_leases: usize,
}

/// Owns deployed worker revisions.
///
/// Revisions are immutable: redeploying produces a new revision id, so jobs
/// holding an older one are unaffected.
pub struct FleetManager {
    substrate: Arc<dyn ComputeSubstrate>,
    config: FleetConfig,
    invocation_timeout: Duration,
    revisions: DashMap<String, RevisionEntry>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for FleetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetManager")
            .field("revisions", &self.revisions.len())
            .field("invocation_timeout", &self.invocation_timeout)
            .finish()
    }
}

impl FleetManager {
    pub fn new(
        substrate: Arc<dyn ComputeSubstrate>,
        config: FleetConfig,
        invocation_timeout: Duration,
    ) -> Self {
        Self {
            substrate,
            config,
            invocation_timeout,
            revisions: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Deploy a new immutable revision of `artifact`
    pub async fn deploy(
        &self,
        artifact: ArtifactRef,
        region: Region,
        memory_mb: u32,
        timeout_seconds: u32,
    ) -> RenderResult<FleetRevision> {
        if !(self.config.min_memory_mb..=self.config.max_memory_mb).contains(&memory_mb) {
            return Err(RenderError::invalid_spec(format!(
                "memory {memory_mb}MB outside {}..={}MB",
                self.config.min_memory_mb, self.config.max_memory_mb
            )));
        }
        if !(1..=self.config.max_timeout_seconds).contains(&timeout_seconds) {
            return Err(RenderError::invalid_spec(format!(
                "timeout {timeout_seconds}s outside 1..={}s",
                self.config.max_timeout_seconds
            )));
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let revision = FleetRevision {
            revision_id: format!(
                "{}-mem{memory_mb}mb-{timeout_seconds}sec-{seq}",
                self.config.revision_prefix
            ),
            region,
            memory_mb,
            timeout_seconds,
            artifact,
            created_at: Utc::now(),
        };

        self.substrate.provision(&revision).await?;
        self.revisions.insert(
            revision.revision_id.clone(),
            RevisionEntry {
                revision: revision.clone(),
                active_leases: 0,
            },
        );

        info!(
            revision_id = %revision.revision_id,
            region = %revision.region,
            memory_mb = memory_mb,
            timeout_seconds = timeout_seconds,
            artifact = %revision.artifact.name,
            "Deployed worker revision"
        );
        Ok(revision)
    }

    /// Revisions in `region`, oldest first
    pub fn list(&self, region: &Region) -> Vec<FleetRevision> {
        let mut revisions: Vec<FleetRevision> = self
            .revisions
            .iter()
            .filter(|entry| entry.revision.region == *region)
            .map(|entry| entry.revision.clone())
            .collect();
        revisions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.revision_id.cmp(&b.revision_id))
        });
        revisions
    }

    pub fn get_info(&self, revision_id: &str) -> RenderResult<FleetRevision> {
        self.revisions
            .get(revision_id)
            .map(|entry| entry.revision.clone())
            .ok_or_else(|| RenderError::not_found(format!("revision {revision_id}")))
    }

    /// Active orchestrations holding `revision_id`
    pub fn active_leases(&self, revision_id: &str) -> usize {
        self.revisions
            .get(revision_id)
            .map(|entry| entry.active_leases)
            .unwrap_or(0)
    }

    /// Delete a revision unless a job still targets it
    pub async fn delete(&self, revision_id: &str) -> RenderResult<()> {
        let removed = self
            .revisions
            .remove_if(revision_id, |_, entry| entry.active_leases == 0);

        match removed {
            Some((_, entry)) => {
                self.substrate.decommission(&entry.revision).await?;
                info!(revision_id = %revision_id, "Deleted worker revision");
                Ok(())
            }
            None => match self.revisions.get(revision_id) {
                Some(entry) => Err(RenderError::RevisionInUse {
                    revision_id: revision_id.to_string(),
                    active_jobs: entry.active_leases,
                }),
                None => Err(RenderError::not_found(format!("revision {revision_id}"))),
            },
        }
    }

    /// Invoke a worker, turning a missed deadline into a transient timeout
    pub async fn invoke(
        &self,
        revision_id: &str,
        payload: WorkerPayload,
    ) -> RenderResult<WorkerOutcome> {
        let revision = self.get_info(revision_id)?;
        let job_id = payload.job_id.clone();
        let chunk_index = payload.chunk_index;

        debug!(
            revision_id = %revision_id,
            job_id = %job_id,
            chunk_index = chunk_index,
            attempt = payload.attempt,
            "Invoking worker"
        );

        match tokio::time::timeout(
            self.invocation_timeout,
            self.substrate.invoke(&revision, payload),
        )
        .await
        {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                warn!(
                    revision_id = %revision_id,
                    job_id = %job_id,
                    chunk_index = chunk_index,
                    timeout_ms = self.invocation_timeout.as_millis() as u64,
                    "Worker invocation timed out"
                );
                Ok(WorkerOutcome::transient(
                    FailureKind::Timeout,
                    format!(
                        "invocation exceeded {}ms",
                        self.invocation_timeout.as_millis()
                    ),
                ))
            }
        }
    }

    fn acquire(self: &Arc<Self>, revision_id: &str) -> RenderResult<RevisionLease> {
        let mut entry = self
            .revisions
            .get_mut(revision_id)
            .ok_or_else(|| RenderError::not_found(format!("revision {revision_id}")))?;
        entry.active_leases += 1;
        Ok(RevisionLease {
            manager: Arc::clone(self),
            revision_id: revision_id.to_string(),
        })
    }

    fn release(&self, revision_id: &str) {
        if let Some(mut entry) = self.revisions.get_mut(revision_id) {
            entry.active_leases = entry.active_leases.saturating_sub(1);
        }
    }
}

/// Marks a revision as the active target of one orchestration until dropped
#[derive(Debug)]
pub struct RevisionLease {
    manager: Arc<FleetManager>,
    revision_id: String,
}

impl RevisionLease {
    pub fn revision_id(&self) -> &str {
        &self.revision_id
    }
}

impl Drop for RevisionLease {
    fn drop(&mut self) {
        self.manager.release(&self.revision_id);
    }
}

/// Explicit fleet target passed to the orchestrator and dispatcher
#[derive(Debug, Clone)]
pub struct FleetHandle {
    manager: Arc<FleetManager>,
    revision_id: String,
}

impl FleetHandle {
    pub fn new(manager: Arc<FleetManager>, revision_id: impl Into<String>) -> RenderResult<Self> {
        let revision_id = revision_id.into();
        manager.get_info(&revision_id)?;
        Ok(Self {
            manager,
            revision_id,
        })
    }

    pub fn revision_id(&self) -> &str {
        &self.revision_id
    }

    pub fn manager(&self) -> &Arc<FleetManager> {
        &self.manager
    }

    pub fn revision(&self) -> RenderResult<FleetRevision> {
        self.manager.get_info(&self.revision_id)
    }

    pub fn acquire_lease(&self) -> RenderResult<RevisionLease> {
        self.manager.acquire(&self.revision_id)
    }

    pub async fn invoke(&self, payload: WorkerPayload) -> RenderResult<WorkerOutcome> {
        self.manager.invoke(&self.revision_id, payload).await
    }
}
