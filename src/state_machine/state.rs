//! Turn state types

use crate::agents::Specialist;
use crate::conversation::ToolInvocation;
use serde::Serialize;

/// Where a turn is
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// Waiting for the user's message
    Idle,

    /// Router decision in flight
    Routing,

    /// A specialist owns the rest of the turn
    Dispatched {
        target: Specialist,
        phase: AgentPhase,
    },

    /// Turn finished
    Terminal { outcome: TurnOutcome },
}

/// Specialist loop position
#[derive(Debug, Clone, PartialEq)]
pub enum AgentPhase {
    /// Decision function in flight
    Deciding,
    /// Waiting for this tool call to complete
    ExecutingTool { invocation: ToolInvocation },
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// A specialist gave its final response
    Answered,
    /// The router picked no specialist
    Declined,
    /// The step budget ran out
    StepsExhausted,
    /// A system error ended the turn
    Failed,
}

impl TurnState {
    pub fn outcome(&self) -> Option<TurnOutcome> {
        match self {
            TurnState::Terminal { outcome } => Some(*outcome),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Routing => "routing",
            TurnState::Dispatched {
                phase: AgentPhase::Deciding,
                ..
            } => "deciding",
            TurnState::Dispatched {
                phase: AgentPhase::ExecutingTool { .. },
                ..
            } => "executing_tool",
            TurnState::Terminal { .. } => "terminal",
        }
    }
}

/// Read-only inputs to a transition
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Steps left in the working copy before this event
    pub remaining_steps: u32,
}

impl TurnContext {
    pub fn new(remaining_steps: u32) -> Self {
        Self { remaining_steps }
    }
}
