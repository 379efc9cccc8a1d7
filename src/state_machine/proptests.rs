//! Property-based tests for the state machine
//!
//! Drives whole turns through a small simulator that applies effects to a
//! [`ConversationState`] the way the runtime does.

use super::transition::{GENERIC_FAILURE, STEPS_EXHAUSTED};
use super::*;
use crate::agents::{Agent, Decision, Specialist};
use crate::conversation::{ConversationState, Message, Role, StateUpdate, ToolInvocation};
use crate::tools::ToolOutput;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Scripted agents
// ============================================================================

#[derive(Debug, Clone)]
enum RouterMove {
    Route(Specialist),
    Decline,
    Fail,
}

#[derive(Debug, Clone)]
enum SpecialistMove {
    CallTool { succeed: bool },
    Respond,
    Fail,
}

fn arb_specialist() -> impl Strategy<Value = Specialist> {
    prop_oneof![Just(Specialist::Appointment), Just(Specialist::Prescription)]
}

fn arb_router_move() -> impl Strategy<Value = RouterMove> {
    prop_oneof![
        4 => arb_specialist().prop_map(RouterMove::Route),
        1 => Just(RouterMove::Decline),
        1 => Just(RouterMove::Fail),
    ]
}

fn arb_specialist_move() -> impl Strategy<Value = SpecialistMove> {
    prop_oneof![
        6 => any::<bool>().prop_map(|succeed| SpecialistMove::CallTool { succeed }),
        1 => Just(SpecialistMove::Respond),
        1 => Just(SpecialistMove::Fail),
    ]
}

fn arb_script() -> impl Strategy<Value = Vec<SpecialistMove>> {
    proptest::collection::vec(arb_specialist_move(), 0..15)
}

// ============================================================================
// Simulator
// ============================================================================

struct Trace {
    state: ConversationState,
    outcome: TurnOutcome,
    decisions: u32,
    emitted: Vec<String>,
    checkpoints: Vec<ConversationState>,
}

fn router_event(router: &RouterMove) -> Event {
    match router {
        RouterMove::Route(target) => Event::Decided {
            decision: Decision::Route {
                target: *target,
                invocation: ToolInvocation::new("route", target.handoff_tool(), json!({})),
            },
        },
        RouterMove::Decline => Event::Decided {
            decision: Decision::Decline {
                text: "Only care questions, please.".into(),
            },
        },
        RouterMove::Fail => Event::DecisionFailed {
            reason: "provider down".into(),
        },
    }
}

fn specialist_event(next: Option<&SpecialistMove>, n: u32) -> Event {
    match next {
        Some(SpecialistMove::CallTool { succeed }) => Event::Decided {
            decision: Decision::CallTool {
                text: String::new(),
                invocation: ToolInvocation::new(
                    format!("call-{n}"),
                    "get_providers",
                    json!({ "succeed": succeed }),
                ),
            },
        },
        Some(SpecialistMove::Fail) => Event::DecisionFailed {
            reason: "timeout".into(),
        },
        Some(SpecialistMove::Respond) | None => Event::Decided {
            decision: Decision::Respond {
                text: "All set.".into(),
            },
        },
    }
}

/// Run one turn to completion, panicking if it does not end within
/// `max_events` events.
fn simulate(
    prior: ConversationState,
    step_limit: u32,
    router: &RouterMove,
    script: &[SpecialistMove],
    max_events: usize,
) -> Trace {
    let mut conv = prior;
    let mut turn = TurnState::Idle;
    let mut script = script.iter();
    let mut decisions = 0;
    let mut emitted = Vec::new();
    let mut checkpoints = Vec::new();
    let mut pending = vec![Event::UserMessage {
        message: Message::user("hello"),
    }];
    let mut events = 0;

    while let Some(event) = pending.pop() {
        events += 1;
        assert!(events <= max_events, "turn did not terminate");

        let ctx = TurnContext::new(conv.remaining_steps);
        let result = transition(&turn, &ctx, event).expect("scripted events are valid");
        turn = result.new_state;

        for effect in result.effects {
            let before = conv.clone();
            match effect {
                Effect::BeginTurn { message } => conv.begin_turn(message, step_limit),
                Effect::ConsumeStep => conv.consume_step(),
                Effect::AppendMessage { message } => conv.append(message),
                Effect::ApplyUpdate { update } => conv.merge(StateUpdate::working(update)),
                Effect::Handoff { target } => conv.active_agent = Some(target),
                Effect::Checkpoint => checkpoints.push(conv.clone()),
                Effect::Emit { text } => emitted.push(text),
                Effect::RequestDecision { agent } => {
                    decisions += 1;
                    pending.push(match agent {
                        Agent::Router => router_event(router),
                        Agent::Specialist(_) => specialist_event(script.next(), decisions),
                    });
                }
                Effect::ExecuteTool { invocation, .. } => {
                    let output = if invocation.arguments["succeed"] == json!(true) {
                        ToolOutput::success("done")
                    } else {
                        ToolOutput::error("Slot not found")
                    };
                    pending.push(Event::ToolCompleted {
                        call_id: invocation.id,
                        output,
                    });
                }
            }
            assert!(conv.extends(&before), "message log was rewritten");
        }
    }

    Trace {
        state: conv,
        outcome: turn.outcome().expect("turn ended"),
        decisions,
        emitted,
        checkpoints,
    }
}

fn prior_state() -> ConversationState {
    let mut state = ConversationState::new(Message::user("earlier"), 0, None);
    state.append(Message::assistant("earlier reply"));
    state
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Every turn ends, and within a bound set by the step budget
    #[test]
    fn prop_turn_terminates(
        step_limit in 1u32..12,
        router in arb_router_move(),
        script in arb_script(),
    ) {
        let max_events = 2 * step_limit as usize + 4;
        let trace = simulate(prior_state(), step_limit, &router, &script, max_events);
        prop_assert!(trace.decisions <= step_limit);
    }

    // Each decision spends exactly one step
    #[test]
    fn prop_one_step_per_decision(
        step_limit in 1u32..12,
        router in arb_router_move(),
        script in arb_script(),
    ) {
        let trace = simulate(prior_state(), step_limit, &router, &script, 64);
        prop_assert_eq!(trace.state.remaining_steps, step_limit - trace.decisions);
    }

    // History from earlier turns survives unchanged at the front of the log
    #[test]
    fn prop_history_is_preserved(
        step_limit in 1u32..12,
        router in arb_router_move(),
        script in arb_script(),
    ) {
        let prior = prior_state();
        let trace = simulate(prior.clone(), step_limit, &router, &script, 64);
        prop_assert!(trace.state.extends(&prior));
        for checkpoint in &trace.checkpoints {
            prop_assert!(checkpoint.extends(&prior));
        }
        prop_assert_eq!(trace.checkpoints.last(), Some(&trace.state));
    }

    // Every tool call in the log is answered by the next message
    #[test]
    fn prop_tool_calls_are_answered(
        step_limit in 1u32..12,
        router in arb_router_move(),
        script in arb_script(),
    ) {
        let trace = simulate(prior_state(), step_limit, &router, &script, 64);
        let messages = trace.state.messages();
        for (i, message) in messages.iter().enumerate() {
            if let Some(call) = &message.tool_call {
                let reply = messages.get(i + 1);
                prop_assert!(reply.is_some(), "unanswered call {}", call.id);
                prop_assert_eq!(reply.and_then(|m| m.tool_call_id.as_deref()), Some(call.id.as_str()));
            }
        }
    }

    // A turn always leaves an assistant message last, and text the client
    // never saw streamed is emitted
    #[test]
    fn prop_turn_ends_with_assistant_reply(
        step_limit in 1u32..12,
        router in arb_router_move(),
        script in arb_script(),
    ) {
        let trace = simulate(prior_state(), step_limit, &router, &script, 64);
        let last = trace.state.messages().last().expect("non-empty log");
        prop_assert_eq!(last.role, Role::Assistant);
        prop_assert!(last.tool_call.is_none());

        match trace.outcome {
            TurnOutcome::Answered => prop_assert!(trace.emitted.is_empty()),
            TurnOutcome::Failed => prop_assert_eq!(trace.emitted, vec![GENERIC_FAILURE.to_string()]),
            TurnOutcome::StepsExhausted => {
                prop_assert_eq!(trace.emitted, vec![STEPS_EXHAUSTED.to_string()]);
            }
            TurnOutcome::Declined => prop_assert_eq!(trace.emitted.len(), 1),
        }
    }

    // Routing always records the specialist that took over
    #[test]
    fn prop_route_sets_active_agent(
        step_limit in 2u32..12,
        target in arb_specialist(),
        script in arb_script(),
    ) {
        let trace = simulate(prior_state(), step_limit, &RouterMove::Route(target), &script, 64);
        prop_assert_eq!(trace.state.active_agent, Some(target));
        let ack = target.handoff_ack();
        prop_assert!(trace.state.messages().iter().any(|m| m.content == ack));
    }

    // No transition accepts a user message mid-turn
    #[test]
    fn prop_busy_rejects_messages(target in arb_specialist(), executing in any::<bool>()) {
        let phase = if executing {
            AgentPhase::ExecutingTool {
                invocation: ToolInvocation::new("t", "get_providers", json!({})),
            }
        } else {
            AgentPhase::Deciding
        };
        for state in [TurnState::Routing, TurnState::Dispatched { target, phase: phase.clone() }] {
            let result = transition(
                &state,
                &TurnContext::new(5),
                Event::UserMessage { message: Message::user("again") },
            );
            prop_assert!(matches!(result, Err(TransitionError::TurnInProgress)));
        }
    }
}
