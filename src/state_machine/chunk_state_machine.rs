use super::{
    errors::{StateMachineError, StateMachineResult},
    events::ChunkEvent,
    states::ChunkState,
};

/// Pure chunk transition table.
///
/// Chunk records live inside the progress tracker, so this works on a bare
/// state instead of owning the record.
pub struct ChunkStateMachine;

impl ChunkStateMachine {
    pub fn next_state(current: ChunkState, event: &ChunkEvent) -> StateMachineResult<ChunkState> {
        let target = match (current, event) {
            (ChunkState::Queued, ChunkEvent::Invoke) => ChunkState::Invoked,
            (ChunkState::Invoked, ChunkEvent::Progress) => ChunkState::Rendering,
            (ChunkState::Rendering, ChunkEvent::Progress) => ChunkState::Rendering,

            // A worker may report completion without a progress ping; a result
            // may also land for a chunk the dispatcher already put back
            (ChunkState::Queued | ChunkState::Invoked | ChunkState::Rendering, ChunkEvent::Complete) => {
                ChunkState::Rendered
            }
            (ChunkState::Queued | ChunkState::Invoked | ChunkState::Rendering, ChunkEvent::Fail(_)) => {
                ChunkState::Failed
            }
            (ChunkState::Invoked | ChunkState::Rendering, ChunkEvent::Requeue) => ChunkState::Queued,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_then_complete() {
        let invoked = ChunkStateMachine::next_state(ChunkState::Queued, &ChunkEvent::Invoke).unwrap();
        let rendering = ChunkStateMachine::next_state(invoked, &ChunkEvent::Progress).unwrap();
        assert_eq!(
            ChunkStateMachine::next_state(rendering, &ChunkEvent::Complete).unwrap(),
            ChunkState::Rendered
        );
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for state in [ChunkState::Rendered, ChunkState::Failed] {
            for event in [
                ChunkEvent::Invoke,
                ChunkEvent::Complete,
                ChunkEvent::Requeue,
                ChunkEvent::fail_with_error("late"),
            ] {
                assert!(ChunkStateMachine::next_state(state, &event).is_err());
            }
        }
    }

    #[test]
    fn test_cannot_invoke_in_flight_chunk() {
        assert!(ChunkStateMachine::next_state(ChunkState::Invoked, &ChunkEvent::Invoke).is_err());
        assert!(ChunkStateMachine::next_state(ChunkState::Queued, &ChunkEvent::Requeue).is_err());
    }
}
