//! Prescription specialist tools

use super::{labelled, DomainError, RefillInput, ToolContext, ToolKind, ToolOutput, ToolResult, MIN_LEAD_MINUTES};
use crate::conversation::WorkingUpdate;
use crate::domain::{format_ist, parse_ist, DeliveryStatus, Prescription};
use crate::llm::ToolDefinition;
use chrono::Duration;
use serde_json::{json, Value};

/// Minimum days between two refills of one prescription
pub const REFILL_INTERVAL_DAYS: i64 = 4;

pub(super) fn definition(kind: ToolKind) -> ToolDefinition {
    let (description, input_schema) = match kind {
        ToolKind::RefillPrescription => (
            "Refill one of the patient's prescriptions. prescription_id must come from the \
             latest prescription listing. date_time is YYYY-MM-DD HH:MM:SS in Indian Standard \
             Time, at least 15 minutes after the current date and time and at least 4 days \
             after the last refill.",
            json!({
                "type": "object",
                "required": ["prescription_id", "date_time"],
                "properties": {
                    "prescription_id": {"type": "string", "description": "Prescription id"},
                    "date_time": {"type": "string", "description": "YYYY-MM-DD HH:MM:SS (IST)"}
                }
            }),
        ),
        _ => (
            "List the patient's prescriptions with refill dates and delivery status.",
            json!({"type": "object", "properties": {}}),
        ),
    };

    ToolDefinition {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn describe(prescription: &Prescription) -> Value {
    json!({
        "id": prescription.id,
        "name": prescription.name,
        "description": prescription.description,
        "last_refill_date": format_ist(prescription.last_refill_date),
        "next_refill_date": prescription.next_refill_date.map(format_ist),
        "delivery_status": prescription.delivery_status,
    })
}

pub(super) fn list_prescriptions(ctx: &ToolContext) -> ToolResult {
    let patient = ctx.patient()?;
    let prescriptions = ctx.repos().prescriptions_for_patient(patient.id);
    if prescriptions.is_empty() {
        return Err(DomainError::NoPrescriptions.into());
    }

    let rows: Vec<Value> = prescriptions.iter().map(describe).collect();
    let output = labelled("Available prescriptions", &rows)?;
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        available_prescriptions: Some(prescriptions),
        ..WorkingUpdate::default()
    }))
}

pub(super) fn refill_prescription(ctx: &ToolContext, input: &RefillInput) -> ToolResult {
    let patient = ctx.patient()?;
    let prescription = ctx
        .repos()
        .prescriptions
        .get(input.prescription_id)
        .filter(|p| p.patient_id == patient.id)
        .ok_or(DomainError::PrescriptionNotFound)?;

    let requested = parse_ist(&input.date_time)
        .ok_or_else(|| DomainError::InvalidDateTime(input.date_time.clone()))?;
    if requested < ctx.now + Duration::minutes(MIN_LEAD_MINUTES) {
        return Err(DomainError::RefillTooSoon.into());
    }
    if prescription.last_refill_date + Duration::days(REFILL_INTERVAL_DAYS) > requested {
        return Err(DomainError::RefillTooEarly.into());
    }

    let refilled = ctx
        .repos()
        .prescriptions
        .update(prescription.id, |p| {
            p.delivery_status = DeliveryStatus::Pending;
            p.last_refill_date = requested;
            p.next_refill_date = Some(requested + Duration::days(REFILL_INTERVAL_DAYS));
            p.clone()
        })
        .ok_or(DomainError::PrescriptionNotFound)?;
    tracing::info!(
        thread_id = %ctx.thread_id,
        prescription_id = %refilled.id,
        "Prescription refilled"
    );

    let output = format!("Prescription refilled successfully: {}", describe(&refilled));
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        selected_prescription: Some(refilled),
        ..WorkingUpdate::default()
    }))
}
