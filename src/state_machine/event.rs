//! Events that drive a turn

use crate::agents::Decision;
use crate::conversation::Message;
use crate::tools::ToolOutput;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// The client sent a message; starts the turn
    UserMessage { message: Message },

    /// The current agent's decision function returned
    Decided { decision: Decision },

    /// The decision function failed (transport, provider, timeout)
    DecisionFailed { reason: String },

    /// The tool requested by the specialist finished
    ToolCompleted { call_id: String, output: ToolOutput },
}
