//! Agents: the router and the specialists
//!
//! Each agent is a decision function over the conversation history. This
//! module turns a [`ConversationState`] into an [`LlmRequest`] for a given
//! agent and interprets the model's reply as a [`Decision`].

mod prompt;

use crate::conversation::{ConversationState, Message, Role, ToolInvocation};
use crate::llm::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, SystemContent, ToolDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Text used when the router picks no specialist and says nothing useful
pub const DEFAULT_DECLINE: &str =
    "I'm sorry, I can only help with appointments and prescriptions. Is there anything I can do for you there?";

/// A specialist the router can hand a conversation to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialist {
    Appointment,
    Prescription,
}

impl Specialist {
    pub const ALL: [Specialist; 2] = [Specialist::Appointment, Specialist::Prescription];

    pub fn name(self) -> &'static str {
        match self {
            Specialist::Appointment => "appointment_agent",
            Specialist::Prescription => "prescription_agent",
        }
    }

    /// Name of the router tool that transfers control to this specialist
    pub fn handoff_tool(self) -> &'static str {
        match self {
            Specialist::Appointment => "handoff_to_appointment_agent",
            Specialist::Prescription => "handoff_to_prescription_agent",
        }
    }

    pub fn from_handoff_tool(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.handoff_tool() == name)
    }

    /// Content of the tool-result message confirming the handoff
    pub fn handoff_ack(self) -> String {
        let short = match self {
            Specialist::Appointment => "appointment",
            Specialist::Prescription => "prescription",
        };
        format!("successfully handoff to {short} agent")
    }
}

impl fmt::Display for Specialist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any decision-making agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    Router,
    Specialist(Specialist),
}

impl Agent {
    pub fn name(self) -> &'static str {
        match self {
            Agent::Router => "supervisor",
            Agent::Specialist(s) => s.name(),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an agent decided to do with the current history
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Router picked a specialist via its handoff tool
    Route {
        target: Specialist,
        invocation: ToolInvocation,
    },
    /// Router picked nobody; `text` is shown to the user
    Decline { text: String },
    /// Specialist produced its final answer for the turn
    Respond { text: String },
    /// Specialist wants exactly one tool run
    CallTool {
        text: String,
        invocation: ToolInvocation,
    },
}

/// Build the model request for `agent` over the full history
pub fn build_request(
    agent: Agent,
    state: &ConversationState,
    tools: Vec<ToolDefinition>,
    now: DateTime<Utc>,
) -> LlmRequest {
    let system = match agent {
        Agent::Router => prompt::router(),
        Agent::Specialist(Specialist::Appointment) => prompt::appointment(state.patient.as_ref(), now),
        Agent::Specialist(Specialist::Prescription) => {
            prompt::prescription(state.patient.as_ref(), now)
        }
    };

    LlmRequest {
        system: vec![SystemContent::new(system)],
        messages: history(state.messages()),
        tools,
        max_tokens: None,
        temperature: Some(0.0),
    }
}

/// Convert the message log into provider messages.
///
/// Tool calls with no recorded result (a turn interrupted mid-tool) are
/// dropped; providers reject a call that is never answered.
fn history(messages: &[Message]) -> Vec<LlmMessage> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::User => out.push(LlmMessage::user(vec![ContentBlock::text(&message.content)])),
            Role::Assistant => {
                let mut content = Vec::new();
                if !message.content.is_empty() {
                    content.push(ContentBlock::text(&message.content));
                }
                if let Some(call) = &message.tool_call {
                    if answered.contains(call.id.as_str()) {
                        content.push(ContentBlock::tool_use(
                            &call.id,
                            &call.name,
                            call.arguments.clone(),
                        ));
                    }
                }
                if !content.is_empty() {
                    out.push(LlmMessage::assistant(content));
                }
            }
            Role::ToolResult => {
                let Some(call_id) = &message.tool_call_id else {
                    continue;
                };
                out.push(LlmMessage::user(vec![ContentBlock::tool_result(
                    call_id,
                    &message.content,
                    false,
                )]));
            }
        }
    }
    out
}

/// Interpret a model reply according to what `agent` is allowed to do
pub fn interpret(agent: Agent, response: &LlmResponse) -> Decision {
    let text = response.text();
    let uses = response.tool_uses();

    match agent {
        Agent::Router => {
            let routed = uses.iter().find_map(|(id, name, input)| {
                Specialist::from_handoff_tool(name).map(|target| (target, *id, *name, *input))
            });
            match routed {
                Some((target, id, name, input)) => {
                    if uses.len() > 1 {
                        tracing::warn!(count = uses.len(), "Router proposed several tool calls, using the first handoff");
                    }
                    Decision::Route {
                        target,
                        invocation: ToolInvocation::new(id, name, input.clone()),
                    }
                }
                None => {
                    let text = text.trim();
                    Decision::Decline {
                        text: if text.is_empty() {
                            DEFAULT_DECLINE.to_string()
                        } else {
                            text.to_string()
                        },
                    }
                }
            }
        }
        Agent::Specialist(specialist) => match uses.first() {
            Some((id, name, input)) => {
                if uses.len() > 1 {
                    tracing::warn!(
                        agent = %specialist,
                        count = uses.len(),
                        "Specialist proposed several tool calls, executing only the first"
                    );
                }
                Decision::CallTool {
                    text,
                    invocation: ToolInvocation::new(*id, *name, (*input).clone()),
                }
            }
            None => Decision::Respond { text },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Usage;
    use serde_json::json;

    fn response(content: Vec<ContentBlock>) -> LlmResponse {
        LlmResponse {
            content,
            end_turn: true,
            usage: Usage::default(),
        }
    }

    #[test]
    fn test_handoff_tool_names_roundtrip() {
        for s in Specialist::ALL {
            assert_eq!(Specialist::from_handoff_tool(s.handoff_tool()), Some(s));
        }
        assert_eq!(Specialist::from_handoff_tool("get_providers"), None);
        assert_eq!(
            Specialist::Appointment.handoff_ack(),
            "successfully handoff to appointment agent"
        );
    }

    #[test]
    fn test_router_selects_first_handoff() {
        let decision = interpret(
            Agent::Router,
            &response(vec![
                ContentBlock::tool_use("c1", "handoff_to_prescription_agent", json!({})),
                ContentBlock::tool_use("c2", "handoff_to_appointment_agent", json!({})),
            ]),
        );
        match decision {
            Decision::Route { target, invocation } => {
                assert_eq!(target, Specialist::Prescription);
                assert_eq!(invocation.id, "c1");
            }
            other => panic!("expected route, got {other:?}"),
        }
    }

    #[test]
    fn test_router_without_handoff_declines() {
        let decision = interpret(Agent::Router, &response(vec![ContentBlock::text("  ")]));
        assert_eq!(
            decision,
            Decision::Decline {
                text: DEFAULT_DECLINE.to_string()
            }
        );

        let decision = interpret(
            Agent::Router,
            &response(vec![ContentBlock::text("I can only help with your care.")]),
        );
        assert_eq!(
            decision,
            Decision::Decline {
                text: "I can only help with your care.".to_string()
            }
        );
    }

    #[test]
    fn test_specialist_keeps_only_first_tool_call() {
        let decision = interpret(
            Agent::Specialist(Specialist::Appointment),
            &response(vec![
                ContentBlock::text("Let me check"),
                ContentBlock::tool_use("c1", "get_providers", json!({})),
                ContentBlock::tool_use("c2", "list_appointments", json!({})),
            ]),
        );
        match decision {
            Decision::CallTool { text, invocation } => {
                assert_eq!(text, "Let me check");
                assert_eq!(invocation.name, "get_providers");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_history_drops_unanswered_tool_calls() {
        let mut state = ConversationState::new(Message::user("hi"), 10, None);
        state.append(Message::assistant_tool_call(
            "",
            ToolInvocation::new("c1", "get_providers", json!({})),
        ));
        state.append(Message::tool_result("c1", "[]"));
        state.append(Message::assistant_tool_call(
            "",
            ToolInvocation::new("c2", "list_appointments", json!({})),
        ));

        let messages = history(state.messages());
        assert_eq!(messages.len(), 3);
        assert!(matches!(
            messages[2].content[0],
            ContentBlock::ToolResult { ref tool_use_id, .. } if tool_use_id == "c1"
        ));
    }

    #[test]
    fn test_build_request_uses_agent_prompt() {
        let state = ConversationState::new(Message::user("refill please"), 10, None);
        let request = build_request(
            Agent::Specialist(Specialist::Prescription),
            &state,
            vec![],
            Utc::now(),
        );
        assert_eq!(request.system.len(), 1);
        assert!(request.system[0].text.contains("prescription"));
        assert_eq!(request.messages.len(), 1);
    }
}
