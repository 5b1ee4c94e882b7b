// Dispatcher: the only step that advances the agent queue

use tracing::debug;

use crate::agents::state::{ConversationState, CurrentAgent, StateUpdate};

/// Pops the front of `agents_to_run` into `current_agent`, or signals `done`
/// when the queue is empty. Pure; the same state always yields the same update.
pub fn dispatch(state: &ConversationState) -> StateUpdate {
    let mut remaining = state.agents_to_run.clone();
    match remaining.pop_front() {
        Some(next) => {
            debug!("Dispatcher: next agent {} ({} queued after it)", next, remaining.len());
            StateUpdate {
                current_agent: Some(CurrentAgent::Agent(next)),
                agents_to_run: Some(remaining),
                ..Default::default()
            }
        }
        None => StateUpdate {
            current_agent: Some(CurrentAgent::Done),
            ..Default::default()
        },
    }
}
