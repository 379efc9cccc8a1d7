//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O. Scenarios run
//! the real state machine, agent request building and tool handlers; only
//! the model and the store are faked.

use super::executor::{Orchestrator, TurnError, TurnSettings};
use super::traits::*;
use crate::agents::Specialist;
use crate::conversation::{ConversationState, Message};
use crate::domain::seed::DEFAULT_PATIENT_ID;
use crate::domain::Repositories;
use crate::llm::{
    ContentBlock, FragmentSender, LlmError, LlmRequest, LlmResponse, LlmService, Usage,
};
use crate::state_machine::TurnOutcome;
use crate::tools::test_support::seeded;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock LLM Service
// ============================================================================

struct MockReply {
    result: Result<LlmResponse, LlmError>,
    fragments: Vec<String>,
    delay: Option<std::time::Duration>,
}

/// Mock model that returns queued replies and records every request
pub struct MockLlmService {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn queue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Queue a plain text reply streamed as the given fragments
    pub fn queue_text(&self, fragments: &[&str]) {
        self.queue(MockReply {
            result: Ok(LlmResponse {
                content: vec![ContentBlock::text(fragments.concat())],
                end_turn: true,
                usage: Usage::default(),
            }),
            fragments: fragments.iter().map(ToString::to_string).collect(),
            delay: None,
        });
    }

    /// Queue a reply holding exactly one tool call
    pub fn queue_tool(&self, id: &str, name: &str, input: Value) {
        self.queue(MockReply {
            result: Ok(LlmResponse {
                content: vec![ContentBlock::tool_use(id, name, input)],
                end_turn: false,
                usage: Usage::default(),
            }),
            fragments: vec![],
            delay: None,
        });
    }

    pub fn queue_handoff(&self, target: Specialist) {
        self.queue_tool("handoff_1", target.handoff_tool(), json!({}));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.queue(MockReply {
            result: Err(error),
            fragments: vec![],
            delay: None,
        });
    }

    /// Queue a text reply that arrives only after `delay`
    pub fn queue_slow_text(&self, text: &str, delay: std::time::Duration) {
        self.queue(MockReply {
            result: Ok(LlmResponse {
                content: vec![ContentBlock::text(text)],
                end_turn: true,
                usage: Usage::default(),
            }),
            fragments: vec![text.to_string()],
            delay: Some(delay),
        });
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        let Some(reply) = reply else {
            return Err(LlmError::network("No mock response queued"));
        };

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        if let (Some(tx), Ok(_)) = (fragments, &reply.result) {
            for fragment in reply.fragments {
                let _ = tx.send(fragment);
            }
        }
        reply.result
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// In-memory State Store
// ============================================================================

/// State store backed by a map. Saves can be made to fail.
#[derive(Default)]
pub struct InMemoryStateStore {
    sessions: Mutex<HashMap<String, ConversationState>>,
    fail_saves: Mutex<bool>,
    saves: Mutex<usize>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self) {
        *self.fail_saves.lock().unwrap() = true;
    }

    pub fn snapshot(&self, thread_id: &str) -> Option<ConversationState> {
        self.sessions.lock().unwrap().get(thread_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.snapshot(thread_id))
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        *self.saves.lock().unwrap() += 1;
        self.sessions
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

type TestOrchestrator = Orchestrator<Arc<InMemoryStateStore>, LlmDecisionClient, RegistryToolExecutor>;

/// Orchestrator wired to mock models, an in-memory store and seeded repositories
pub struct Harness {
    pub router: Arc<MockLlmService>,
    pub specialist: Arc<MockLlmService>,
    pub store: Arc<InMemoryStateStore>,
    pub repos: Arc<Repositories>,
    pub orchestrator: TestOrchestrator,
}

impl Harness {
    pub fn new(step_limit: u32) -> Self {
        Self::with_timeout(step_limit, None)
    }

    pub fn with_timeout(step_limit: u32, decision_timeout: Option<std::time::Duration>) -> Self {
        let router = Arc::new(MockLlmService::new());
        let specialist = Arc::new(MockLlmService::new());
        let store = Arc::new(InMemoryStateStore::new());
        let repos = seeded();

        let settings = TurnSettings {
            step_limit,
            session_ttl: Duration::minutes(15),
            decision_timeout,
            patient: repos.patients.get(DEFAULT_PATIENT_ID),
        };
        let decisions = LlmDecisionClient::new(
            Arc::clone(&router) as Arc<dyn LlmService>,
            Arc::clone(&specialist) as Arc<dyn LlmService>,
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            decisions,
            RegistryToolExecutor::new(Arc::clone(&repos)),
            settings,
        );

        Self {
            router,
            specialist,
            store,
            repos,
            orchestrator,
        }
    }

    /// Run a turn and collect everything sent to the client
    pub async fn turn(&self, thread_id: &str, text: &str) -> (Result<TurnOutcome, TurnError>, String) {
        self.turn_with(thread_id, text, &CancellationToken::new()).await
    }

    pub async fn turn_with(
        &self,
        thread_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> (Result<TurnOutcome, TurnError>, String) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = self
            .orchestrator
            .run_turn(thread_id, Message::user(text), &tx, cancel)
            .await;
        drop(tx);

        let mut streamed = String::new();
        while let Some(fragment) = rx.recv().await {
            streamed.push_str(&fragment);
        }
        (outcome, streamed)
    }

    pub fn state(&self, thread_id: &str) -> ConversationState {
        self.store.snapshot(thread_id).expect("session saved")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::state_machine::transition::STEPS_EXHAUSTED;
    use crate::state_machine::GENERIC_FAILURE;

    fn contents(state: &ConversationState) -> Vec<(Role, String)> {
        state
            .messages()
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_new_session_routes_then_answers() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_tool("call_1", "get_providers", json!({}));
        h.specialist.queue_text(&["We have ", "three doctors."]);

        let (outcome, streamed) = h.turn("t1", "Which doctors can I see?").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Answered);
        assert_eq!(streamed, "We have three doctors.");

        let state = h.state("t1");
        let log = contents(&state);
        assert_eq!(log[0], (Role::User, "Which doctors can I see?".to_string()));
        assert_eq!(
            log[2],
            (
                Role::ToolResult,
                "successfully handoff to appointment agent".to_string()
            )
        );
        assert!(log[4].1.starts_with("Available providers"));
        assert_eq!(log.last().unwrap().1, "We have three doctors.");
        assert_eq!(state.remaining_steps, 7);
        assert_eq!(state.active_agent, Some(Specialist::Appointment));
        assert_eq!(state.working.providers.len(), 3);
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_turn_history() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Prescription);
        h.specialist.queue_text(&["You have one prescription."]);
        h.router.queue_handoff(Specialist::Prescription);
        h.specialist.queue_text(&["Refill booked."]);

        let (first, _) = h.turn("t1", "What prescriptions do I have?").await;
        let (second, _) = h.turn("t1", "Refill it please").await;
        assert_eq!(first.unwrap(), TurnOutcome::Answered);
        assert_eq!(second.unwrap(), TurnOutcome::Answered);

        let requests = h.router.recorded_requests();
        assert_eq!(requests.len(), 2);
        let first_len = requests[0].messages.len();
        assert!(requests[1].messages.len() > first_len);
        assert_eq!(requests[1].messages[..first_len], requests[0].messages[..]);

        let state = h.state("t1");
        assert_eq!(state.remaining_steps, 8);
        let users: Vec<_> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["What prescriptions do I have?", "Refill it please"]);
    }

    #[tokio::test]
    async fn test_router_decline_is_single_message() {
        let h = Harness::new(10);
        h.router.queue_text(&["I can only help with appointments and prescriptions."]);

        let (outcome, streamed) = h.turn("t1", "What's the weather?").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Declined);
        assert_eq!(streamed, "I can only help with appointments and prescriptions.");
        assert!(h.specialist.recorded_requests().is_empty());

        let state = h.state("t1");
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.remaining_steps, 9);
    }

    #[tokio::test]
    async fn test_decision_failure_apologises_and_saves() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_error(LlmError::server_error("upstream 500"));

        let (outcome, streamed) = h.turn("t1", "Book me in").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Failed);
        assert_eq!(streamed, GENERIC_FAILURE);
        assert_eq!(h.state("t1").messages().last().unwrap().content, GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_step_exhaustion_gives_best_effort_reply() {
        let h = Harness::new(3);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_tool("c1", "get_providers", json!({}));
        h.specialist.queue_tool("c2", "list_appointments", json!({}));
        h.specialist.queue_text(&["never reached"]);

        let (outcome, streamed) = h.turn("t1", "Show me everything").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::StepsExhausted);
        assert_eq!(streamed, STEPS_EXHAUSTED);
        assert_eq!(h.specialist.recorded_requests().len(), 2);

        let state = h.state("t1");
        assert_eq!(state.remaining_steps, 0);
        assert_eq!(state.messages().last().unwrap().content, STEPS_EXHAUSTED);
    }

    #[tokio::test]
    async fn test_failed_tool_validation_continues_loop() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_tool(
            "c1",
            "book_appointment",
            json!({"slot_id": uuid::Uuid::new_v4()}),
        );
        h.specialist.queue_text(&["That slot is gone, pick another."]);

        let (outcome, streamed) = h.turn("t1", "Book slot X").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Answered);
        assert_eq!(streamed, "That slot is gone, pick another.");

        let state = h.state("t1");
        let result = state
            .messages()
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c1"))
            .unwrap();
        assert_eq!(result.role, Role::ToolResult);
        assert!(state.working.selected_slot.is_none());
        assert!(h.repos.appointments.all().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failure_message() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Prescription);
        h.specialist.queue_tool("c1", "book_appointment", json!({}));
        h.specialist.queue_text(&["Sorry about that."]);

        let (outcome, _) = h.turn("t1", "hello").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Answered);
        let state = h.state("t1");
        assert!(state
            .messages()
            .iter()
            .any(|m| m.content == "Unknown tool: book_appointment"));
    }

    #[tokio::test]
    async fn test_store_failure_is_generic_apology() {
        let h = Harness::new(10);
        h.store.fail_saves();
        h.router.queue_handoff(Specialist::Appointment);

        let (outcome, streamed) = h.turn("t1", "hello").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Failed);
        assert_eq!(streamed, GENERIC_FAILURE);
        assert!(h.store.snapshot("t1").is_none());
        assert!(h.router.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_decision_timeout_is_system_error() {
        let h = Harness::with_timeout(10, Some(std::time::Duration::from_millis(20)));
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist
            .queue_slow_text("too late", std::time::Duration::from_secs(5));

        let (outcome, streamed) = h.turn("t1", "hello").await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Failed);
        assert_eq!(streamed, GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_cancel_keeps_committed_state() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist
            .queue_slow_text("too late", std::time::Duration::from_secs(5));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let (outcome, streamed) = h.turn_with("t1", "hello", &cancel).await;
        assert!(matches!(outcome, Err(TurnError::Cancelled)));
        assert!(streamed.is_empty());

        let state = h.state("t1");
        assert_eq!(state.messages().len(), 3);
        assert_eq!(state.active_agent, Some(Specialist::Appointment));
    }

    #[tokio::test]
    async fn test_turns_on_one_session_do_not_interleave() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist
            .queue_slow_text("first answer", std::time::Duration::from_millis(50));
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_text(&["second answer"]);

        let (a, b) = tokio::join!(h.turn("t1", "first"), h.turn("t1", "second"));
        assert_eq!(a.0.unwrap(), TurnOutcome::Answered);
        assert_eq!(b.0.unwrap(), TurnOutcome::Answered);

        let log = contents(&h.state("t1"));
        assert_eq!(log.len(), 8);
        assert_eq!(log[0].0, Role::User);
        assert_eq!(log[3].1, "first answer");
        assert_eq!(log[4].0, Role::User);
        assert_eq!(log[7].1, "second answer");
    }

    #[tokio::test]
    async fn test_each_checkpoint_extends_previous() {
        let h = Harness::new(10);
        h.router.queue_handoff(Specialist::Appointment);
        h.specialist.queue_tool("c1", "get_providers", json!({}));
        h.specialist.queue_text(&["done"]);

        let _ = h.turn("t1", "hi").await;
        // begin, route, tool result, final answer
        assert_eq!(h.store.save_count(), 4);
    }
}
