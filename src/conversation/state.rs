//! Conversation state snapshot and its merge rules

use super::Message;
use crate::agents::Specialist;
use crate::domain::{Patient, Prescription, Provider, Slot};
use serde::{Deserialize, Serialize};

/// Domain-scoped fields the specialists accumulate across turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingFields {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub selected_provider: Option<Provider>,
    #[serde(default)]
    pub available_slots: Vec<Slot>,
    #[serde(default)]
    pub selected_slot: Option<Slot>,
    #[serde(default)]
    pub available_prescriptions: Vec<Prescription>,
    #[serde(default)]
    pub selected_prescription: Option<Prescription>,
}

/// Replacement values for working fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingUpdate {
    pub providers: Option<Vec<Provider>>,
    pub selected_provider: Option<Provider>,
    pub available_slots: Option<Vec<Slot>>,
    pub selected_slot: Option<Slot>,
    pub available_prescriptions: Option<Vec<Prescription>>,
    pub selected_prescription: Option<Prescription>,
}

impl WorkingUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial update applied to a [`ConversationState`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Appended in order after the existing log
    pub messages: Vec<Message>,
    pub working: WorkingUpdate,
}

impl StateUpdate {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            working: WorkingUpdate::default(),
        }
    }

    pub fn working(working: WorkingUpdate) -> Self {
        Self {
            messages: Vec::new(),
            working,
        }
    }
}

/// Full state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub remaining_steps: u32,
    #[serde(default)]
    pub patient: Option<Patient>,
    #[serde(default)]
    pub working: WorkingFields,
    /// Specialist that handled the most recent turn
    #[serde(default)]
    pub active_agent: Option<Specialist>,
}

impl ConversationState {
    /// Initial state for a session with no stored history
    pub fn new(first_message: Message, step_limit: u32, patient: Option<Patient>) -> Self {
        Self {
            messages: vec![first_message],
            remaining_steps: step_limit,
            patient,
            working: WorkingFields::default(),
            active_agent: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Apply an update: messages are appended, working fields replaced
    /// where the update carries a value. Nothing is ever cleared here.
    pub fn merge(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        let WorkingUpdate {
            providers,
            selected_provider,
            available_slots,
            selected_slot,
            available_prescriptions,
            selected_prescription,
        } = update.working;

        if let Some(v) = providers {
            self.working.providers = v;
        }
        if let Some(v) = selected_provider {
            self.working.selected_provider = Some(v);
        }
        if let Some(v) = available_slots {
            self.working.available_slots = v;
        }
        if let Some(v) = selected_slot {
            self.working.selected_slot = Some(v);
        }
        if let Some(v) = available_prescriptions {
            self.working.available_prescriptions = v;
        }
        if let Some(v) = selected_prescription {
            self.working.selected_prescription = Some(v);
        }
    }

    pub fn append(&mut self, message: Message) {
        self.merge(StateUpdate::message(message));
    }

    /// Start a new turn on resumed state: append the user's message and
    /// refill the step budget.
    pub fn begin_turn(&mut self, user_message: Message, step_limit: u32) {
        self.append(user_message);
        self.remaining_steps = step_limit;
    }

    /// Spend one step of the turn budget
    pub fn consume_step(&mut self) {
        self.remaining_steps = self.remaining_steps.saturating_sub(1);
    }

    /// True if `self`'s log begins with every message of `earlier`, in order
    pub fn extends(&self, earlier: &ConversationState) -> bool {
        self.messages.len() >= earlier.messages.len()
            && self
                .messages
                .iter()
                .zip(earlier.messages.iter())
                .all(|(a, b)| a == b)
    }
}
