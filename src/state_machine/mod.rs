//! # Lifecycle State Machines
//!
//! Explicit transition tables for jobs and chunks. Terminal states reject
//! every event, which is what keeps late worker results from rewriting a
//! finished job.

pub mod chunk_state_machine;
pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod states;

pub use chunk_state_machine::ChunkStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{ChunkEvent, JobEvent};
pub use job_state_machine::{JobStateMachine, JobTransition};
pub use states::{ChunkState, JobState};
