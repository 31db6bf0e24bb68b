use super::{
    errors::{StateMachineError, StateMachineResult},
    events::JobEvent,
    states::JobState,
};
use crate::models::{FailureReason, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied job transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTransition {
    pub from: JobState,
    pub to: JobState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// In-memory job lifecycle; the orchestrator holds one per job
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    job_id: JobId,
    state: JobState,
    failure_reason: Option<FailureReason>,
    history: Vec<JobTransition>,
}

impl JobStateMachine {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
            failure_reason: None,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> JobState {
        self.state
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.failure_reason.as_ref()
    }

    pub fn history(&self) -> &[JobTransition] {
        &self.history
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply an event, returning the new state
    pub fn transition(&mut self, event: JobEvent) -> StateMachineResult<JobState> {
        let target = determine_target_state(&self.job_id, self.state, &event)?;

        self.history.push(JobTransition {
            from: self.state,
            to: target,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
        if let JobEvent::Fail(reason) = event {
            self.failure_reason = Some(reason);
        }
        self.state = target;

        Ok(target)
    }
}

fn determine_target_state(
    job_id: &JobId,
    current: JobState,
    event: &JobEvent,
) -> StateMachineResult<JobState> {
    if current.is_terminal() {
        return Err(StateMachineError::AlreadyTerminal {
            entity: "job",
            id: job_id.to_string(),
            state: current.to_string(),
        });
    }

    let target = match (current, event) {
        (JobState::Pending, JobEvent::Start) => JobState::InProgress,
        (JobState::InProgress, JobEvent::BeginStitch) => JobState::Stitching,
        (JobState::Stitching, JobEvent::Complete) => JobState::Done,

        // Any live state may fail or time out
        (_, JobEvent::Fail(_)) => JobState::Failed,
        (_, JobEvent::TimeOut) => JobState::TimedOut,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}
