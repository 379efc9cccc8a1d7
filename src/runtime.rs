//! Runtime for executing turns
//!
//! Wires the pure state machine to its I/O: the state store, the decision
//! function and the tool executor. Also holds the output batcher used by the
//! transport.

pub mod batcher;
mod executor;
mod locks;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use batcher::{batch_stream, Batch};
pub use executor::{Orchestrator, TurnError, TurnSettings};
pub use traits::*;

/// Type alias for production orchestrator with concrete implementations
pub type ProductionOrchestrator =
    Orchestrator<SqliteStateStore, LlmDecisionClient, RegistryToolExecutor>;
