//! Effects produced by state transitions

use crate::agents::{Agent, Specialist};
use crate::conversation::{Message, ToolInvocation, WorkingUpdate};

/// Effects to be executed after state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append the user's message and refill the step budget
    BeginTurn { message: Message },

    /// Call `agent`'s decision function over the full history
    RequestDecision { agent: Agent },

    /// Run one tool on behalf of `agent`
    ExecuteTool {
        agent: Agent,
        invocation: ToolInvocation,
    },

    /// Spend one step of the turn budget
    ConsumeStep,

    /// Append a message to the working copy
    AppendMessage { message: Message },

    /// Replace working fields from a tool result
    ApplyUpdate { update: WorkingUpdate },

    /// Carry the working copy over to `target`
    Handoff { target: Specialist },

    /// Save the working copy to the state store
    Checkpoint,

    /// Send text to the client that was not streamed by a decision
    Emit { text: String },
}

impl Effect {
    pub fn append(message: Message) -> Self {
        Effect::AppendMessage { message }
    }

    pub fn emit(text: impl Into<String>) -> Self {
        Effect::Emit { text: text.into() }
    }
}
