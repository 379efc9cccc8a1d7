//! Conversation data model
//!
//! A session owns one [`ConversationState`]: an append-only message log, a
//! per-turn step budget and the domain working fields the specialists build
//! up over time. All mutation goes through [`ConversationState::merge`].

mod handoff;
mod message;
mod state;

pub use handoff::{HandoffCommand, HandoffError};
pub use message::{Message, Role, ToolInvocation};
pub use state::{ConversationState, StateUpdate, WorkingFields, WorkingUpdate};
