//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use crate::agents::{build_request, interpret, Agent, Decision};
use crate::conversation::{ConversationState, ToolInvocation};
use crate::db::{Database, DbError};
use crate::domain::Repositories;
use crate::llm::{FragmentSender, LlmError, LlmService};
use crate::tools::{self, ToolContext, ToolOutput, ToolRegistry};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("State store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, TTL-bound storage of full conversation snapshots
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the live state for a session, `None` if it never existed or expired
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Replace the stored snapshot and extend its life by `ttl`
    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}

/// The opaque decision function each agent calls
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Decide what `agent` does next given the full state. Text the decision
    /// streams to the user goes to `fragments`.
    async fn decide(
        &self,
        agent: Agent,
        state: &ConversationState,
        fragments: Option<&FragmentSender>,
    ) -> Result<Decision, LlmError>;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one tool call. Never fails; failures are encoded in the output.
    async fn execute(
        &self,
        agent: Agent,
        invocation: &ToolInvocation,
        thread_id: &str,
        state: &ConversationState,
    ) -> ToolOutput;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        (**self).load(thread_id).await
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        (**self).save(thread_id, state, ttl).await
    }
}

#[async_trait]
impl<T: DecisionClient + ?Sized> DecisionClient for Arc<T> {
    async fn decide(
        &self,
        agent: Agent,
        state: &ConversationState,
        fragments: Option<&FragmentSender>,
    ) -> Result<Decision, LlmError> {
        (**self).decide(agent, state, fragments).await
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(
        &self,
        agent: Agent,
        invocation: &ToolInvocation,
        thread_id: &str,
        state: &ConversationState,
    ) -> ToolOutput {
        (**self).execute(agent, invocation, thread_id, state).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a StateStore
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || db.load_state(&thread_id, Utc::now()))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(loaded?)
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let thread_id = thread_id.to_string();
        let state = state.clone();
        tokio::task::spawn_blocking(move || db.save_state(&thread_id, &state, ttl, Utc::now()))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }
}

/// Decision function backed by chat-completion models. The router and the
/// specialists may use different models.
pub struct LlmDecisionClient {
    router: Arc<dyn LlmService>,
    specialist: Arc<dyn LlmService>,
}

impl LlmDecisionClient {
    pub fn new(router: Arc<dyn LlmService>, specialist: Arc<dyn LlmService>) -> Self {
        Self { router, specialist }
    }
}

#[async_trait]
impl DecisionClient for LlmDecisionClient {
    async fn decide(
        &self,
        agent: Agent,
        state: &ConversationState,
        fragments: Option<&FragmentSender>,
    ) -> Result<Decision, LlmError> {
        let tools = ToolRegistry::for_agent(agent).definitions();
        let request = build_request(agent, state, tools, Utc::now());

        // Router text is only shown when it declines, and then as one message
        let (llm, fragments) = match agent {
            Agent::Router => (&self.router, None),
            Agent::Specialist(_) => (&self.specialist, fragments),
        };
        let response = llm.complete(&request, fragments).await?;
        Ok(interpret(agent, &response))
    }
}

/// Adapter running the built-in tool handlers against shared repositories
#[derive(Clone)]
pub struct RegistryToolExecutor {
    repos: Arc<Repositories>,
}

impl RegistryToolExecutor {
    pub fn new(repos: Arc<Repositories>) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(
        &self,
        agent: Agent,
        invocation: &ToolInvocation,
        thread_id: &str,
        state: &ConversationState,
    ) -> ToolOutput {
        let ctx = ToolContext::new(
            thread_id,
            state.patient.clone(),
            state.working.clone(),
            Utc::now(),
            Arc::clone(&self.repos),
        );
        tools::execute(agent, invocation, &ctx)
    }
}
