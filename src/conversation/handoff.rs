//! Router → specialist handoff

use super::ConversationState;
use crate::agents::Specialist;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Handoff to {target} would drop or reorder messages ({before} before, {after} after)")]
    HistoryRewritten {
        target: Specialist,
        before: usize,
        after: usize,
    },
}

/// Transfer of a live conversation to a specialist, carrying the full state
#[derive(Debug, Clone)]
pub struct HandoffCommand {
    pub target: Specialist,
    pub state: ConversationState,
}

impl HandoffCommand {
    /// Build a handoff from the router's working copy. `baseline` is the
    /// state as it stood when routing began; the carried state must extend it.
    pub fn new(
        target: Specialist,
        mut state: ConversationState,
        baseline: &ConversationState,
    ) -> Result<Self, HandoffError> {
        if !state.extends(baseline) {
            return Err(HandoffError::HistoryRewritten {
                target,
                before: baseline.messages().len(),
                after: state.messages().len(),
            });
        }
        state.active_agent = Some(target);
        Ok(Self { target, state })
    }
}
