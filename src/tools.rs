//! Tools the agents can call
//!
//! The tool set is closed: every tool is a [`ToolKind`], arguments are parsed
//! into a typed [`ToolCommand`] before anything runs, and every outcome is a
//! [`ToolOutput`]. Nothing a handler does can escape [`execute`] as an error
//! or a panic.

mod appointment;
mod handoff;
mod prescription;

use crate::agents::{Agent, Specialist};
use crate::conversation::{ToolInvocation, WorkingFields, WorkingUpdate};
use crate::domain::{Patient, Repositories};
use crate::llm::ToolDefinition;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use handoff::handoff_definition;

/// Earliest acceptable lead time for a requested date/time
pub const MIN_LEAD_MINUTES: i64 = 15;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    /// Working-field replacements, applied only on success
    pub update: WorkingUpdate,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            update: WorkingUpdate::default(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            update: WorkingUpdate::default(),
        }
    }

    pub fn with_update(mut self, update: WorkingUpdate) -> Self {
        self.update = update;
        self
    }
}

/// Business-rule violations. The display text is shown to the model as is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Patient not found")]
    PatientNotFound,
    #[error("No appointments found")]
    NoAppointments,
    #[error("No providers found")]
    NoProviders,
    #[error("Provider not found")]
    ProviderNotFound,
    #[error("Invalid date and time '{0}', expected format YYYY-MM-DD HH:MM:SS")]
    InvalidDateTime(String),
    #[error(
        "The requested date and time must be at least {} minutes after the current date and time",
        MIN_LEAD_MINUTES
    )]
    TooSoon,
    #[error("No available slots found for the selected date")]
    NoSlotsOnDate,
    #[error("Slot not found")]
    SlotNotFound,
    #[error("Selected slot is not available")]
    SlotUnavailable,
    #[error("Appointment not found")]
    AppointmentNotFound,
    #[error("Appointment is already completed")]
    AlreadyCompleted,
    #[error("Appointment is already cancelled")]
    AlreadyCancelled,
    #[error("Appointment is already confirmed")]
    AlreadyConfirmed,
    #[error("No available slots found for reschedule, do you want to change the provider?")]
    NoRescheduleSlots,
    #[error("No prescriptions found")]
    NoPrescriptions,
    #[error("Prescription not found")]
    PrescriptionNotFound,
    #[error(
        "You can refill the prescription only after {} minutes of current date and time",
        MIN_LEAD_MINUTES
    )]
    RefillTooSoon,
    #[error(
        "You can refill the prescription only after {} days of last refill",
        prescription::REFILL_INTERVAL_DAYS
    )]
    RefillTooEarly,
}

/// Anything a handler can fail with
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Rule(#[from] DomainError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ToolResult = Result<ToolOutput, ToolError>;

/// Everything a handler may read, created fresh for each call
#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: String,
    pub patient: Option<Patient>,
    /// Working fields as of the call
    pub working: WorkingFields,
    pub now: DateTime<Utc>,
    repos: Arc<Repositories>,
}

impl ToolContext {
    pub fn new(
        thread_id: impl Into<String>,
        patient: Option<Patient>,
        working: WorkingFields,
        now: DateTime<Utc>,
        repos: Arc<Repositories>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            patient,
            working,
            now,
            repos,
        }
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    pub fn patient(&self) -> Result<&Patient, DomainError> {
        self.patient.as_ref().ok_or(DomainError::PatientNotFound)
    }
}

/// Every tool known to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListAppointments,
    GetProviders,
    GetAvailableSlots,
    BookAppointment,
    GetSlotForReschedule,
    RescheduleAppointment,
    CancelAppointment,
    ConfirmAppointment,
    ListPrescriptions,
    RefillPrescription,
}

impl ToolKind {
    pub const ALL: [ToolKind; 10] = [
        ToolKind::ListAppointments,
        ToolKind::GetProviders,
        ToolKind::GetAvailableSlots,
        ToolKind::BookAppointment,
        ToolKind::GetSlotForReschedule,
        ToolKind::RescheduleAppointment,
        ToolKind::CancelAppointment,
        ToolKind::ConfirmAppointment,
        ToolKind::ListPrescriptions,
        ToolKind::RefillPrescription,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListAppointments => "list_appointments",
            ToolKind::GetProviders => "get_providers",
            ToolKind::GetAvailableSlots => "get_available_slots",
            ToolKind::BookAppointment => "book_appointment",
            ToolKind::GetSlotForReschedule => "get_slot_for_reschedule",
            ToolKind::RescheduleAppointment => "reschedule_appointment",
            ToolKind::CancelAppointment => "cancel_appointment",
            ToolKind::ConfirmAppointment => "confirm_appointment",
            ToolKind::ListPrescriptions => "list_prescriptions",
            ToolKind::RefillPrescription => "refill_prescription",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Which specialist may call this tool
    pub fn owner(self) -> Specialist {
        match self {
            ToolKind::ListPrescriptions | ToolKind::RefillPrescription => Specialist::Prescription,
            _ => Specialist::Appointment,
        }
    }

    /// Prefix for failures that are not business-rule violations
    fn failure_prefix(self) -> &'static str {
        match self {
            ToolKind::ListAppointments => "Error listing appointments",
            ToolKind::GetProviders => "Error getting providers",
            ToolKind::GetAvailableSlots => "Error getting available slots",
            ToolKind::BookAppointment => "Error booking appointment",
            ToolKind::GetSlotForReschedule => "Error getting slot for reschedule",
            ToolKind::RescheduleAppointment => "Error rescheduling appointment",
            ToolKind::CancelAppointment => "Error canceling appointment",
            ToolKind::ConfirmAppointment => "Error confirming appointment",
            ToolKind::ListPrescriptions => "Error listing prescriptions",
            ToolKind::RefillPrescription => "Error refilling prescription",
        }
    }

    pub fn definition(self) -> ToolDefinition {
        match self.owner() {
            Specialist::Prescription => prescription::definition(self),
            Specialist::Appointment => appointment::definition(self),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsInput {
    pub provider_id: Uuid,
    pub date_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotInput {
    pub slot_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleInput {
    pub appointment_id: Uuid,
    pub new_slot_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefillInput {
    pub prescription_id: Uuid,
    pub date_time: String,
}

/// A validated tool call
#[derive(Debug, Clone)]
pub enum ToolCommand {
    ListAppointments,
    GetProviders,
    GetAvailableSlots(AvailableSlotsInput),
    BookAppointment(SlotInput),
    GetSlotForReschedule(AppointmentInput),
    RescheduleAppointment(RescheduleInput),
    CancelAppointment(AppointmentInput),
    ConfirmAppointment(AppointmentInput),
    ListPrescriptions,
    RefillPrescription(RefillInput),
}

fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T, serde_json::Error> {
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments)
}

impl ToolCommand {
    pub fn parse(kind: ToolKind, arguments: &Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ToolKind::ListAppointments => ToolCommand::ListAppointments,
            ToolKind::GetProviders => ToolCommand::GetProviders,
            ToolKind::GetAvailableSlots => ToolCommand::GetAvailableSlots(parse_args(arguments)?),
            ToolKind::BookAppointment => ToolCommand::BookAppointment(parse_args(arguments)?),
            ToolKind::GetSlotForReschedule => {
                ToolCommand::GetSlotForReschedule(parse_args(arguments)?)
            }
            ToolKind::RescheduleAppointment => {
                ToolCommand::RescheduleAppointment(parse_args(arguments)?)
            }
            ToolKind::CancelAppointment => ToolCommand::CancelAppointment(parse_args(arguments)?),
            ToolKind::ConfirmAppointment => ToolCommand::ConfirmAppointment(parse_args(arguments)?),
            ToolKind::ListPrescriptions => ToolCommand::ListPrescriptions,
            ToolKind::RefillPrescription => ToolCommand::RefillPrescription(parse_args(arguments)?),
        })
    }

    fn run(self, ctx: &ToolContext) -> ToolResult {
        match self {
            ToolCommand::ListAppointments => appointment::list_appointments(ctx),
            ToolCommand::GetProviders => appointment::get_providers(ctx),
            ToolCommand::GetAvailableSlots(input) => appointment::get_available_slots(ctx, &input),
            ToolCommand::BookAppointment(input) => appointment::book_appointment(ctx, &input),
            ToolCommand::GetSlotForReschedule(input) => {
                appointment::get_slot_for_reschedule(ctx, &input)
            }
            ToolCommand::RescheduleAppointment(input) => {
                appointment::reschedule_appointment(ctx, &input)
            }
            ToolCommand::CancelAppointment(input) => appointment::cancel_appointment(ctx, &input),
            ToolCommand::ConfirmAppointment(input) => appointment::confirm_appointment(ctx, &input),
            ToolCommand::ListPrescriptions => prescription::list_prescriptions(ctx),
            ToolCommand::RefillPrescription(input) => {
                prescription::refill_prescription(ctx, &input)
            }
        }
    }
}

/// Tools available to one agent.
///
/// The router only ever sees the handoff tools. Handoffs are carried out by
/// the state machine, so the router has nothing it can execute here.
pub struct ToolRegistry {
    agent: Agent,
    kinds: Vec<ToolKind>,
}

impl ToolRegistry {
    pub fn for_agent(agent: Agent) -> Self {
        let kinds = match agent {
            Agent::Router => Vec::new(),
            Agent::Specialist(specialist) => ToolKind::ALL
                .into_iter()
                .filter(|k| k.owner() == specialist)
                .collect(),
        };
        Self { agent, kinds }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        match self.agent {
            Agent::Router => Specialist::ALL.into_iter().map(handoff_definition).collect(),
            Agent::Specialist(_) => self.kinds.iter().map(|k| k.definition()).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|k| self.kinds.contains(k))
    }
}

/// Run one tool call for `agent`. Always yields an output; failures are
/// encoded in it and carry no working-field update.
pub fn execute(agent: Agent, invocation: &ToolInvocation, ctx: &ToolContext) -> ToolOutput {
    let registry = ToolRegistry::for_agent(agent);
    let Some(kind) = registry.get(&invocation.name) else {
        tracing::warn!(agent = %agent, tool = %invocation.name, "Tool not available to agent");
        return ToolOutput::error(format!("Unknown tool: {}", invocation.name));
    };

    let command = match ToolCommand::parse(kind, &invocation.arguments) {
        Ok(command) => command,
        Err(e) => {
            tracing::info!(tool = kind.name(), error = %e, "Rejected tool arguments");
            return ToolOutput::error(format!("Invalid input: {e}"));
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| command.run(ctx)));
    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(ToolError::Rule(rule))) => ToolOutput::error(rule.to_string()),
        Ok(Err(fault)) => {
            tracing::error!(tool = kind.name(), thread_id = %ctx.thread_id, error = %fault, "Tool fault");
            ToolOutput::error(format!("{}: {fault}", kind.failure_prefix()))
        }
        Err(payload) => {
            let description = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unexpected failure".to_string());
            tracing::error!(tool = kind.name(), thread_id = %ctx.thread_id, panic = %description, "Tool panicked");
            ToolOutput::error(format!("{}: {description}", kind.failure_prefix()))
        }
    };

    if output.success {
        output
    } else {
        ToolOutput::error(output.output)
    }
}

/// Serialize a tool payload after a fixed label, e.g. `Appointments: [...]`
fn labelled(label: &str, value: &impl serde::Serialize) -> Result<String, ToolError> {
    Ok(format!("{label}: {}", serde_json::to_string(value)?))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    fn invoke(name: &str, args: Value) -> ToolInvocation {
        ToolInvocation::new("call_1", name, args)
    }

    #[test]
    fn test_every_kind_has_a_definition() {
        for kind in ToolKind::ALL {
            let def = kind.definition();
            assert_eq!(def.name, kind.name());
            assert_eq!(def.input_schema["type"], "object");
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_registries_partition_tools() {
        let router = ToolRegistry::for_agent(Agent::Router).definitions();
        let appt = ToolRegistry::for_agent(Agent::Specialist(Specialist::Appointment)).definitions();
        let rx = ToolRegistry::for_agent(Agent::Specialist(Specialist::Prescription)).definitions();
        assert_eq!(router.len(), 2);
        assert_eq!(appt.len(), 8);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_tool_from_other_agent_is_rejected() {
        let repos = seeded();
        let ctx = context(&repos, WorkingFields::default());
        let out = execute(
            Agent::Specialist(Specialist::Prescription),
            &invoke("get_providers", json!({})),
            &ctx,
        );
        assert!(!out.success);
        assert_eq!(out.output, "Unknown tool: get_providers");
    }

    #[test]
    fn test_invalid_arguments_are_a_failure_message() {
        let repos = seeded();
        let ctx = context(&repos, WorkingFields::default());
        let out = execute(
            Agent::Specialist(Specialist::Appointment),
            &invoke("book_appointment", json!({"slot_id": "not-a-uuid"})),
            &ctx,
        );
        assert!(!out.success);
        assert!(out.output.starts_with("Invalid input"));
        assert!(out.update.is_empty());
    }

    #[test]
    fn test_router_offers_handoffs_but_executes_nothing() {
        let router = ToolRegistry::for_agent(Agent::Router);
        let names: Vec<String> = router.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["handoff_to_appointment_agent", "handoff_to_prescription_agent"]
        );
        assert_eq!(router.get("handoff_to_prescription_agent"), None);

        let repos = seeded();
        let ctx = context(&repos, WorkingFields::default());
        let out = execute(
            Agent::Router,
            &invoke("handoff_to_prescription_agent", json!({})),
            &ctx,
        );
        assert!(!out.success);
        assert_eq!(out.output, "Unknown tool: handoff_to_prescription_agent");
    }

    #[test]
    fn test_null_arguments_accepted_for_no_arg_tools() {
        let repos = seeded();
        let ctx = context(&repos, WorkingFields::default());
        let out = execute(
            Agent::Specialist(Specialist::Appointment),
            &invoke("get_providers", Value::Null),
            &ctx,
        );
        assert!(out.success);
    }
}
