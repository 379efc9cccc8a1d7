//! Pure state transition function

use super::{AgentPhase, Effect, Event, TurnContext, TurnOutcome, TurnState};
use crate::agents::{Agent, Decision, Specialist};
use crate::conversation::Message;
use thiserror::Error;

/// Apology for any system error that ends a turn
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later";

/// Best-effort reply when the step budget runs out
pub const STEPS_EXHAUSTED: &str = "Sorry, need more steps to process this request.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A turn is already in progress")]
    TurnInProgress,
    #[error("Turn already finished")]
    TurnFinished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Effects closing a turn whose step budget is spent
fn exhausted() -> TransitionResult {
    TransitionResult::new(TurnState::Terminal {
        outcome: TurnOutcome::StepsExhausted,
    })
    .with_effects([
        Effect::append(Message::assistant(STEPS_EXHAUSTED)),
        Effect::emit(STEPS_EXHAUSTED),
        Effect::Checkpoint,
    ])
}

/// Ask `target` for its next decision, or stop if no steps remain
fn next_decision(target: Specialist, remaining: u32, effects: Vec<Effect>) -> TransitionResult {
    if remaining == 0 {
        let mut result = exhausted();
        result.effects.splice(0..0, effects);
        return result;
    }
    TransitionResult::new(TurnState::Dispatched {
        target,
        phase: AgentPhase::Deciding,
    })
    .with_effects(effects)
    .with_effect(Effect::RequestDecision {
        agent: Agent::Specialist(target),
    })
}

/// Pure transition function
///
/// Given the same inputs it always produces the same state and effects, up
/// to generated message ids. It performs no I/O.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let remaining = context.remaining_steps;

    match (state, event) {
        // Idle + UserMessage -> Routing
        (TurnState::Idle, Event::UserMessage { message }) => {
            Ok(TransitionResult::new(TurnState::Routing)
                .with_effect(Effect::BeginTurn { message })
                .with_effect(Effect::Checkpoint)
                .with_effect(Effect::RequestDecision {
                    agent: Agent::Router,
                }))
        }

        (TurnState::Routing | TurnState::Dispatched { .. }, Event::UserMessage { .. }) => {
            Err(TransitionError::TurnInProgress)
        }

        (TurnState::Terminal { .. }, _) => Err(TransitionError::TurnFinished),

        // Deciding with no budget left cannot happen through this function,
        // but a corrupted counter must still end the turn
        (TurnState::Routing, Event::Decided { .. })
        | (
            TurnState::Dispatched {
                phase: AgentPhase::Deciding,
                ..
            },
            Event::Decided { .. },
        ) if remaining == 0 => Ok(exhausted()),

        // ============================================================
        // Routing
        // ============================================================

        (TurnState::Routing, Event::Decided { decision }) => match decision {
            Decision::Route { target, invocation } => {
                let ack = Message::tool_result(&invocation.id, target.handoff_ack());
                let effects = vec![
                    Effect::ConsumeStep,
                    Effect::append(Message::assistant_tool_call("", invocation)),
                    Effect::append(ack),
                    Effect::Handoff { target },
                    Effect::Checkpoint,
                ];
                Ok(next_decision(target, remaining - 1, effects))
            }
            Decision::Decline { text } => Ok(TransitionResult::new(TurnState::Terminal {
                outcome: TurnOutcome::Declined,
            })
            .with_effects([
                Effect::ConsumeStep,
                Effect::append(Message::assistant(text.clone())),
                Effect::emit(text),
                Effect::Checkpoint,
            ])),
            other => Err(TransitionError::InvalidTransition(format!(
                "router cannot produce {other:?}"
            ))),
        },

        // ============================================================
        // Specialist loop
        // ============================================================

        (
            TurnState::Dispatched {
                target,
                phase: AgentPhase::Deciding,
            },
            Event::Decided { decision },
        ) => match decision {
            Decision::Respond { text } => Ok(TransitionResult::new(TurnState::Terminal {
                outcome: TurnOutcome::Answered,
            })
            .with_effects([
                Effect::ConsumeStep,
                Effect::append(Message::assistant(text)),
                Effect::Checkpoint,
            ])),
            Decision::CallTool { text, invocation } => {
                Ok(TransitionResult::new(TurnState::Dispatched {
                    target: *target,
                    phase: AgentPhase::ExecutingTool {
                        invocation: invocation.clone(),
                    },
                })
                .with_effects([
                    Effect::ConsumeStep,
                    Effect::append(Message::assistant_tool_call(text, invocation.clone())),
                    Effect::ExecuteTool {
                        agent: Agent::Specialist(*target),
                        invocation,
                    },
                ]))
            }
            other => Err(TransitionError::InvalidTransition(format!(
                "{target} cannot produce {other:?}"
            ))),
        },

        (
            TurnState::Dispatched {
                target,
                phase: AgentPhase::ExecutingTool { invocation },
            },
            Event::ToolCompleted { call_id, output },
        ) => {
            if call_id != invocation.id {
                return Err(TransitionError::InvalidTransition(format!(
                    "result for {call_id} while waiting on {}",
                    invocation.id
                )));
            }
            let mut effects = vec![Effect::append(Message::tool_result(call_id, output.output))];
            if output.success && !output.update.is_empty() {
                effects.push(Effect::ApplyUpdate {
                    update: output.update,
                });
            }
            effects.push(Effect::Checkpoint);
            Ok(next_decision(*target, remaining, effects))
        }

        // ============================================================
        // Failures
        // ============================================================

        (
            TurnState::Routing
            | TurnState::Dispatched {
                phase: AgentPhase::Deciding,
                ..
            },
            Event::DecisionFailed { .. },
        ) => Ok(TransitionResult::new(TurnState::Terminal {
            outcome: TurnOutcome::Failed,
        })
        .with_effects([
            Effect::ConsumeStep,
            Effect::append(Message::assistant(GENERIC_FAILURE)),
            Effect::emit(GENERIC_FAILURE),
            Effect::Checkpoint,
        ])),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}
