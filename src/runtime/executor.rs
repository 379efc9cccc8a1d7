//! Turn orchestrator
//!
//! Loads the session, feeds events through the pure state machine and
//! carries out the effects it returns until the turn is terminal.

use super::locks::SessionLocks;
use super::traits::{DecisionClient, StateStore, StoreError, ToolExecutor};
use crate::agents::Agent;
use crate::conversation::{ConversationState, HandoffCommand, HandoffError, Message, StateUpdate};
use crate::domain::Patient;
use crate::llm::{FragmentSender, LlmError};
use crate::state_machine::{
    transition, Effect, Event, TransitionError, TurnContext, TurnOutcome, TurnState,
    GENERIC_FAILURE,
};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// System failures that end a turn early
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("State store failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("Effect applied before the turn began")]
    NotStarted,
    #[error("Turn cancelled")]
    Cancelled,
}

/// Per-deployment turn parameters
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Decision budget for one turn
    pub step_limit: u32,
    /// Inactivity window after which a session expires
    pub session_ttl: chrono::Duration,
    /// Wall-clock bound on one decision, if any
    pub decision_timeout: Option<std::time::Duration>,
    /// Patient attached to new sessions
    pub patient: Option<Patient>,
}

/// Mutable state of the turn being run
struct TurnRun<'a> {
    thread_id: &'a str,
    turn: TurnState,
    /// Working copy; `None` until a new session's first message arrives
    state: Option<ConversationState>,
    /// Last snapshot written to the store during this turn
    checkpoint: Option<ConversationState>,
}

impl TurnRun<'_> {
    fn state(&mut self) -> Result<&mut ConversationState, TurnError> {
        self.state.as_mut().ok_or(TurnError::NotStarted)
    }
}

/// Runs turns against any store, decision function and tool executor
pub struct Orchestrator<S, D, T>
where
    S: StateStore,
    D: DecisionClient,
    T: ToolExecutor,
{
    store: S,
    decisions: D,
    tools: T,
    settings: TurnSettings,
    locks: SessionLocks,
}

impl<S, D, T> Orchestrator<S, D, T>
where
    S: StateStore,
    D: DecisionClient,
    T: ToolExecutor,
{
    pub fn new(store: S, decisions: D, tools: T, settings: TurnSettings) -> Self {
        Self {
            store,
            decisions,
            tools,
            settings,
            locks: SessionLocks::new(),
        }
    }

    /// Run one user turn on `thread_id`.
    ///
    /// User-visible text not already streamed by a decision goes to
    /// `fragments`; the turn is over when this returns. System errors are
    /// logged, answered with the generic apology and reported as
    /// [`TurnOutcome::Failed`]. The only error returned is
    /// [`TurnError::Cancelled`]; state saved before cancellation stays saved.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_message: Message,
        fragments: &FragmentSender,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TurnError::Cancelled),
            result = self.drive(thread_id, user_message, fragments) => result,
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    thread_id = %thread_id,
                    outcome = ?outcome,
                    duration_ms = %started.elapsed().as_millis(),
                    "Turn finished"
                );
                Ok(outcome)
            }
            Err(TurnError::Cancelled) => {
                tracing::info!(thread_id = %thread_id, "Turn cancelled");
                Err(TurnError::Cancelled)
            }
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "Turn failed");
                let _ = fragments.send(GENERIC_FAILURE.to_string());
                Ok(TurnOutcome::Failed)
            }
        }
    }

    async fn drive(
        &self,
        thread_id: &str,
        user_message: Message,
        fragments: &FragmentSender,
    ) -> Result<TurnOutcome, TurnError> {
        let _guard = self.locks.acquire(thread_id).await;

        let loaded = self.store.load(thread_id).await?;
        match &loaded {
            Some(state) => tracing::debug!(
                thread_id = %thread_id,
                messages = state.messages().len(),
                "Resuming session"
            ),
            None => tracing::info!(thread_id = %thread_id, "Starting new session"),
        }

        let mut run = TurnRun {
            thread_id,
            turn: TurnState::Idle,
            state: loaded,
            checkpoint: None,
        };

        // Events generated by effects are processed in a loop, never recursively
        let mut events = vec![Event::UserMessage {
            message: user_message,
        }];
        while let Some(event) = events.pop() {
            let remaining = run
                .state
                .as_ref()
                .map_or(self.settings.step_limit, |s| s.remaining_steps);
            let context = TurnContext::new(remaining);
            if let Event::DecisionFailed { reason } = &event {
                tracing::error!(
                    thread_id = %thread_id,
                    state = run.turn.name(),
                    reason = %reason,
                    "Decision failed, ending turn"
                );
            }

            let result = transition(&run.turn, &context, event)?;
            tracing::debug!(
                thread_id = %thread_id,
                from = run.turn.name(),
                to = result.new_state.name(),
                remaining_steps = remaining,
                "Transition"
            );
            run.turn = result.new_state;

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(&mut run, effect, fragments).await? {
                    events.push(generated);
                }
            }
        }

        run.turn.outcome().ok_or_else(|| {
            TransitionError::InvalidTransition(format!("turn stalled in {}", run.turn.name()))
                .into()
        })
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(
        &self,
        run: &mut TurnRun<'_>,
        effect: Effect,
        fragments: &FragmentSender,
    ) -> Result<Option<Event>, TurnError> {
        match effect {
            Effect::BeginTurn { message } => {
                let step_limit = self.settings.step_limit;
                match run.state.as_mut() {
                    Some(state) => {
                        state.begin_turn(message, step_limit);
                        if state.patient.is_none() {
                            state.patient.clone_from(&self.settings.patient);
                        }
                    }
                    None => {
                        run.state = Some(ConversationState::new(
                            message,
                            step_limit,
                            self.settings.patient.clone(),
                        ));
                    }
                }
                Ok(None)
            }

            Effect::RequestDecision { agent } => {
                let thread_id = run.thread_id;
                let state = run.state()?;
                Ok(Some(self.request_decision(thread_id, agent, state, fragments).await))
            }

            Effect::ExecuteTool { agent, invocation } => {
                let thread_id = run.thread_id;
                let state = run.state()?;
                let started = Instant::now();
                let output = self
                    .tools
                    .execute(agent, &invocation, thread_id, state)
                    .await;
                tracing::info!(
                    thread_id = %thread_id,
                    agent = %agent,
                    tool = %invocation.name,
                    success = output.success,
                    duration_ms = %started.elapsed().as_millis(),
                    "Tool completed"
                );
                Ok(Some(Event::ToolCompleted {
                    call_id: invocation.id,
                    output,
                }))
            }

            Effect::ConsumeStep => {
                run.state()?.consume_step();
                Ok(None)
            }

            Effect::AppendMessage { message } => {
                run.state()?.append(message);
                Ok(None)
            }

            Effect::ApplyUpdate { update } => {
                run.state()?.merge(StateUpdate::working(update));
                Ok(None)
            }

            Effect::Handoff { target } => {
                let baseline = run.checkpoint.clone().ok_or(TurnError::NotStarted)?;
                let thread_id = run.thread_id;
                let state = run.state()?;
                let command = HandoffCommand::new(target, state.clone(), &baseline)?;
                *state = command.state;
                tracing::info!(thread_id = %thread_id, target = %command.target, "Handed off");
                Ok(None)
            }

            Effect::Checkpoint => {
                let thread_id = run.thread_id;
                let ttl = self.settings.session_ttl;
                let state = run.state()?;
                self.store.save(thread_id, state, ttl).await?;
                let snapshot = state.clone();
                run.checkpoint = Some(snapshot);
                Ok(None)
            }

            Effect::Emit { text } => {
                // A gone receiver means the client left; the turn still completes
                let _ = fragments.send(text);
                Ok(None)
            }
        }
    }

    async fn request_decision(
        &self,
        thread_id: &str,
        agent: Agent,
        state: &ConversationState,
        fragments: &FragmentSender,
    ) -> Event {
        let started = Instant::now();
        let decision = self.decisions.decide(agent, state, Some(fragments));
        let result = match self.settings.decision_timeout {
            Some(limit) => tokio::time::timeout(limit, decision)
                .await
                .unwrap_or_else(|_| {
                    Err(LlmError::timeout(format!(
                        "Decision timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
            None => decision.await,
        };

        match result {
            Ok(decision) => {
                tracing::debug!(
                    thread_id = %thread_id,
                    agent = %agent,
                    remaining_steps = state.remaining_steps,
                    duration_ms = %started.elapsed().as_millis(),
                    "Decision made"
                );
                Event::Decided { decision }
            }
            Err(e) => {
                tracing::warn!(
                    thread_id = %thread_id,
                    agent = %agent,
                    kind = %e.kind,
                    retryable = e.kind.is_retryable(),
                    duration_ms = %started.elapsed().as_millis(),
                    "Decision call returned an error"
                );
                Event::DecisionFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
