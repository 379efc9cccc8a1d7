//! Domain records the specialist tools operate on
//!
//! Patients, providers, slots, appointments and prescriptions. These are
//! plain rows; the repositories in [`repository`] own them and are handed to
//! tool handlers explicitly.

pub mod repository;
pub mod seed;

pub use repository::Repositories;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format used for every user-facing date/time (interpreted in IST)
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Indian Standard Time, the zone the clinic operates in
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse a `YYYY-MM-DD HH:MM:SS` string as IST wall-clock time
pub fn parse_ist(input: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(input.trim(), DATE_TIME_FORMAT).ok()?;
    ist()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a UTC instant as IST wall-clock time
pub fn format_ist(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&ist()).format(DATE_TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: u32,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
}

/// A bookable one-hour window for a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_available: bool,
}

impl Slot {
    /// View of the slot with times rendered in IST, for tool output
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "provider_id": self.provider_id,
            "start": format_ist(self.start),
            "end": format_ist(self.end),
            "is_available": self.is_available,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked but not yet confirmed by the patient
    Booked,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn book(patient_id: Uuid, slot_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            slot_id,
            created_at: now,
            status: AppointmentStatus::Booked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Shipped,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub name: String,
    pub description: String,
    pub last_refill_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub next_refill_date: Option<DateTime<Utc>>,
}
