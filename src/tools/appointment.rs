//! Appointment specialist tools

use super::{
    labelled, AppointmentInput, AvailableSlotsInput, DomainError, RescheduleInput, SlotInput,
    ToolContext, ToolKind, ToolOutput, ToolResult, MIN_LEAD_MINUTES,
};
use crate::conversation::WorkingUpdate;
use crate::domain::{format_ist, ist, parse_ist, Appointment, AppointmentStatus, Slot};
use crate::llm::ToolDefinition;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

pub(super) fn definition(kind: ToolKind) -> ToolDefinition {
    let (description, input_schema) = match kind {
        ToolKind::ListAppointments => (
            "List all of the patient's appointments with their status and time.",
            no_arguments(),
        ),
        ToolKind::GetProviders => (
            "List every provider with their specialization. Call before looking up slots.",
            no_arguments(),
        ),
        ToolKind::GetAvailableSlots => (
            "List a provider's open slots on the day of the given date and time. \
             provider_id must come from the latest provider listing. date_time is \
             YYYY-MM-DD HH:MM:SS in Indian Standard Time and must be at least 15 minutes \
             after the current date and time.",
            json!({
                "type": "object",
                "required": ["provider_id", "date_time"],
                "properties": {
                    "provider_id": {"type": "string", "description": "Provider id"},
                    "date_time": {"type": "string", "description": "YYYY-MM-DD HH:MM:SS (IST)"}
                }
            }),
        ),
        ToolKind::BookAppointment => (
            "Book the patient into a slot from the latest slot listing.",
            json!({
                "type": "object",
                "required": ["slot_id"],
                "properties": {
                    "slot_id": {"type": "string", "description": "Slot id from the latest listing"}
                }
            }),
        ),
        ToolKind::GetSlotForReschedule => (
            "List open slots with the same provider after the given appointment, to offer \
             as reschedule options.",
            appointment_id_schema(),
        ),
        ToolKind::RescheduleAppointment => (
            "Move an appointment to a slot from the latest reschedule listing.",
            json!({
                "type": "object",
                "required": ["appointment_id", "new_slot_id"],
                "properties": {
                    "appointment_id": {"type": "string", "description": "Appointment id"},
                    "new_slot_id": {"type": "string", "description": "Slot id from the latest listing"}
                }
            }),
        ),
        ToolKind::CancelAppointment => ("Cancel one of the patient's appointments.", appointment_id_schema()),
        ToolKind::ConfirmAppointment => ("Confirm one of the patient's booked appointments.", appointment_id_schema()),
        _ => ("", no_arguments()),
    };

    ToolDefinition {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn no_arguments() -> Value {
    json!({"type": "object", "properties": {}})
}

fn appointment_id_schema() -> Value {
    json!({
        "type": "object",
        "required": ["appointment_id"],
        "properties": {
            "appointment_id": {"type": "string", "description": "Appointment id"}
        }
    })
}

fn earliest_allowed(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(MIN_LEAD_MINUTES)
}

/// Appointment owned by the current patient
fn patient_appointment(ctx: &ToolContext, id: Uuid) -> Result<Appointment, DomainError> {
    let patient = ctx.patient()?;
    ctx.repos()
        .appointments
        .get(id)
        .filter(|a| a.patient_id == patient.id)
        .ok_or(DomainError::AppointmentNotFound)
}

fn ensure_open(appointment: &Appointment) -> Result<(), DomainError> {
    match appointment.status {
        AppointmentStatus::Completed => Err(DomainError::AlreadyCompleted),
        AppointmentStatus::Cancelled => Err(DomainError::AlreadyCancelled),
        AppointmentStatus::Booked | AppointmentStatus::Confirmed => Ok(()),
    }
}

fn describe_slots(slots: &[Slot]) -> Vec<Value> {
    slots.iter().map(Slot::describe).collect()
}

pub(super) fn list_appointments(ctx: &ToolContext) -> ToolResult {
    let patient = ctx.patient()?;
    let appointments = ctx.repos().appointments_for_patient(patient.id);
    if appointments.is_empty() {
        return Err(DomainError::NoAppointments.into());
    }

    let rows: Vec<Value> = appointments
        .iter()
        .map(|a| {
            let slot = ctx.repos().slots.get(a.slot_id);
            let provider = slot
                .as_ref()
                .and_then(|s| ctx.repos().providers.get(s.provider_id));
            json!({
                "id": a.id,
                "status": a.status,
                "booked_at": format_ist(a.created_at),
                "start": slot.as_ref().map(|s| format_ist(s.start)),
                "end": slot.as_ref().map(|s| format_ist(s.end)),
                "provider": provider.map(|p| p.name),
            })
        })
        .collect();

    Ok(ToolOutput::success(labelled("Appointments", &rows)?))
}

pub(super) fn get_providers(ctx: &ToolContext) -> ToolResult {
    let providers = ctx.repos().providers_by_name();
    if providers.is_empty() {
        return Err(DomainError::NoProviders.into());
    }

    let output = labelled("Available providers", &providers)?;
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        providers: Some(providers),
        ..WorkingUpdate::default()
    }))
}

pub(super) fn get_available_slots(ctx: &ToolContext, input: &AvailableSlotsInput) -> ToolResult {
    if ctx.working.providers.is_empty() {
        return Err(DomainError::NoProviders.into());
    }
    let provider = ctx
        .working
        .providers
        .iter()
        .find(|p| p.id == input.provider_id)
        .cloned()
        .ok_or(DomainError::ProviderNotFound)?;

    let requested = parse_ist(&input.date_time)
        .ok_or_else(|| DomainError::InvalidDateTime(input.date_time.clone()))?;
    let earliest = earliest_allowed(ctx.now);
    if requested < earliest {
        return Err(DomainError::TooSoon.into());
    }

    let day = requested.with_timezone(&ist()).date_naive();
    let slots: Vec<Slot> = ctx
        .repos()
        .slots_for_provider(provider.id)
        .into_iter()
        .filter(|s| s.is_available && s.start >= earliest)
        .filter(|s| s.start.with_timezone(&ist()).date_naive() == day)
        .collect();
    if slots.is_empty() {
        return Err(DomainError::NoSlotsOnDate.into());
    }

    let output = labelled("Available slots", &describe_slots(&slots))?;
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        selected_provider: Some(provider),
        available_slots: Some(slots),
        ..WorkingUpdate::default()
    }))
}

pub(super) fn book_appointment(ctx: &ToolContext, input: &SlotInput) -> ToolResult {
    let patient = ctx.patient()?;
    if !ctx.working.available_slots.iter().any(|s| s.id == input.slot_id) {
        return Err(DomainError::SlotNotFound.into());
    }
    let slot = ctx
        .repos()
        .slots
        .get(input.slot_id)
        .ok_or(DomainError::SlotNotFound)?;
    if slot.start < earliest_allowed(ctx.now) {
        return Err(DomainError::TooSoon.into());
    }

    match ctx.repos().reserve_slot(slot.id) {
        None => return Err(DomainError::SlotNotFound.into()),
        Some(false) => return Err(DomainError::SlotUnavailable.into()),
        Some(true) => {}
    }

    let appointment = Appointment::book(patient.id, slot.id, ctx.now);
    ctx.repos().appointments.upsert(appointment.clone());
    tracing::info!(
        thread_id = %ctx.thread_id,
        appointment_id = %appointment.id,
        slot_id = %slot.id,
        "Appointment booked"
    );

    let booked_slot = Slot {
        is_available: false,
        ..slot
    };
    let output = format!(
        "Appointment booked successfully: {}",
        json!({
            "appointment_id": appointment.id,
            "status": appointment.status,
            "start": format_ist(booked_slot.start),
            "end": format_ist(booked_slot.end),
        })
    );
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        selected_slot: Some(booked_slot),
        ..WorkingUpdate::default()
    }))
}

pub(super) fn cancel_appointment(ctx: &ToolContext, input: &AppointmentInput) -> ToolResult {
    let appointment = patient_appointment(ctx, input.appointment_id)?;
    ensure_open(&appointment)?;

    ctx.repos()
        .appointments
        .update(appointment.id, |a| a.status = AppointmentStatus::Cancelled);
    ctx.repos().set_slot_available(appointment.slot_id, true);
    tracing::info!(thread_id = %ctx.thread_id, appointment_id = %appointment.id, "Appointment cancelled");

    Ok(ToolOutput::success("Appointment canceled successfully"))
}

pub(super) fn confirm_appointment(ctx: &ToolContext, input: &AppointmentInput) -> ToolResult {
    let appointment = patient_appointment(ctx, input.appointment_id)?;
    ensure_open(&appointment)?;
    if appointment.status == AppointmentStatus::Confirmed {
        return Err(DomainError::AlreadyConfirmed.into());
    }

    ctx.repos()
        .appointments
        .update(appointment.id, |a| a.status = AppointmentStatus::Confirmed);

    Ok(ToolOutput::success("Appointment confirmed successfully"))
}

pub(super) fn get_slot_for_reschedule(ctx: &ToolContext, input: &AppointmentInput) -> ToolResult {
    let appointment = patient_appointment(ctx, input.appointment_id)?;
    ensure_open(&appointment)?;

    let current = ctx
        .repos()
        .slots
        .get(appointment.slot_id)
        .ok_or(DomainError::SlotNotFound)?;
    let earliest = earliest_allowed(ctx.now);

    let candidates: Vec<Slot> = ctx
        .repos()
        .slots_for_provider(current.provider_id)
        .into_iter()
        .filter(|s| s.id != current.id && s.is_available)
        .filter(|s| s.start > current.end && s.start >= earliest)
        .collect();
    if candidates.is_empty() {
        return Err(DomainError::NoRescheduleSlots.into());
    }

    let output = labelled("Available slots", &describe_slots(&candidates))?;
    Ok(ToolOutput::success(output).with_update(WorkingUpdate {
        available_slots: Some(candidates),
        ..WorkingUpdate::default()
    }))
}

pub(super) fn reschedule_appointment(ctx: &ToolContext, input: &RescheduleInput) -> ToolResult {
    let appointment = patient_appointment(ctx, input.appointment_id)?;
    ensure_open(&appointment)?;

    if !ctx.working.available_slots.iter().any(|s| s.id == input.new_slot_id) {
        return Err(DomainError::SlotNotFound.into());
    }
    let slot = ctx
        .repos()
        .slots
        .get(input.new_slot_id)
        .ok_or(DomainError::SlotNotFound)?;
    if slot.start < earliest_allowed(ctx.now) {
        return Err(DomainError::TooSoon.into());
    }

    match ctx.repos().reserve_slot(slot.id) {
        None => return Err(DomainError::SlotNotFound.into()),
        Some(false) => return Err(DomainError::SlotUnavailable.into()),
        Some(true) => {}
    }
    ctx.repos().set_slot_available(appointment.slot_id, true);
    ctx.repos().appointments.update(appointment.id, |a| {
        a.slot_id = slot.id;
        a.status = AppointmentStatus::Confirmed;
    });
    tracing::info!(
        thread_id = %ctx.thread_id,
        appointment_id = %appointment.id,
        slot_id = %slot.id,
        "Appointment rescheduled"
    );

    Ok(ToolOutput::success("Appointment rescheduled successfully").with_update(WorkingUpdate {
        selected_slot: Some(Slot {
            is_available: false,
            ..slot
        }),
        ..WorkingUpdate::default()
    }))
}
