//! Turn state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions. One
//! turn runs router → specialist loop → terminal; every side effect is an
//! [`Effect`] carried out by the runtime.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{AgentPhase, TurnContext, TurnOutcome, TurnState};
pub use transition::{transition, TransitionError, GENERIC_FAILURE};
