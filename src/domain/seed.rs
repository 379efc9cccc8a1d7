//! Demo data loaded at startup
//!
//! Slots are generated relative to the current date so the schedule always
//! looks fresh.

use super::{ist, DeliveryStatus, Patient, Prescription, Provider, Repositories, Slot};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

/// The patient every session talks on behalf of unless configured otherwise
pub const DEFAULT_PATIENT_ID: Uuid = Uuid::from_u128(0x4349_d0aa_7d30_44fb_99f9_e7c0_e575_2fc0);

/// Days of schedule generated per provider
const SLOT_DAYS_AHEAD: i64 = 15;

/// IST working hours (slot start hours)
const SLOT_HOURS: [u32; 6] = [9, 10, 11, 14, 15, 16];

const PATIENTS: [(u128, &str, u32, &str); 10] = [
    (0x4349_d0aa_7d30_44fb_99f9_e7c0_e575_2fc0, "Alice", 41, "+19876543210"),
    (0x9d96_19a9_512a_4644_9891_4fc4_52b8_9bfe, "Bob", 77, "+19876543211"),
    (0x95e7_6dd7_3b12_4b79_863d_9c85_34c3_af83, "Charlie", 45, "+19876543216"),
    (0x64ea_98c9_0106_409d_8597_45a7_5d76_6859, "Daisy", 64, "+19876543212"),
    (0x5b8a_eacf_7302_4c48_af1f_797c_3f65_9c2d, "Edward", 42, "+19876543217"),
    (0xbe48_648b_33b1_4c5c_af7d_5516_480c_8a3f, "Fay", 76, "+19876543214"),
    (0x7e54_5e38_ec97_4795_8938_3f1d_6efd_8370, "Grace", 32, "+19876543211"),
    (0x6266_3735_f7d8_4cd8_af93_1245_21aa_7b49, "Henry", 55, "+19876543217"),
    (0xd11b_46c1_dcd6_4572_944f_0458_a489_eab6, "Isabel", 62, "+19876543214"),
    (0xf389_991b_7e81_4884_a3fc_3065_d08d_3c6d, "Jack", 47, "+19876543212"),
];

const PROVIDERS: [(u128, &str, &str); 3] = [
    (0xad25_3a2e_a8c8_4863_8cb8_2fa0_b9e2_8e79, "Dr. Smith", "Cardiology"),
    (0xe5bb_9aef_a484_4f9d_9658_c168_1660_0ac7, "Dr. Johnson", "Dermatology"),
    (0x028d_486e_5ae0_4662_9091_e497_3e76_3fe7, "Dr. Brown", "Neurology"),
];

/// (id, patient, name, description, last refill y/m/d, status)
type PrescriptionRow = (u128, u128, &'static str, &'static str, (i32, u32, u32), DeliveryStatus);

const PRESCRIPTIONS: [PrescriptionRow; 10] = [
    (0xe3b3_4884_04e8_4c7b_b5ed_e77a_fb74_b349, 0x4349_d0aa_7d30_44fb_99f9_e7c0_e575_2fc0, "Metformin", "Diabetes medication", (2025, 6, 5), DeliveryStatus::Shipped),
    (0xf955_9ce8_fe7f_4ad2_aea4_a0e9_27d2_6bfa, 0x9d96_19a9_512a_4644_9891_4fc4_52b8_9bfe, "Omeprazole", "Acid reflux relief", (2025, 6, 13), DeliveryStatus::Pending),
    (0x7c0b_fbf6_5f07_44a2_94aa_56c1_7b83_aeaa, 0x95e7_6dd7_3b12_4b79_863d_9c85_34c3_af83, "Omeprazole", "Acid reflux relief", (2025, 7, 10), DeliveryStatus::Shipped),
    (0xcbd1_56ba_a491_4fc2_953f_a6d0_e1ff_80a5, 0x64ea_98c9_0106_409d_8597_45a7_5d76_6859, "Atorvastatin", "Cholesterol medication", (2025, 6, 18), DeliveryStatus::Delivered),
    (0x8da8_1c50_a1ec_49da_8588_df80_1bff_659e, 0x5b8a_eacf_7302_4c48_af1f_797c_3f65_9c2d, "Metformin", "Diabetes medication", (2025, 6, 29), DeliveryStatus::Pending),
    (0x196b_1570_fd98_42f7_b97e_959b_6ab0_6959, 0xbe48_648b_33b1_4c5c_af7d_5516_480c_8a3f, "Atorvastatin", "Cholesterol medication", (2025, 5, 13), DeliveryStatus::Shipped),
    (0x1e65_d85c_2e2e_481b_98a4_8178_20c1_d5ee, 0x7e54_5e38_ec97_4795_8938_3f1d_6efd_8370, "Omeprazole", "Acid reflux relief", (2025, 7, 13), DeliveryStatus::Pending),
    (0x4a22_bc9d_0d01_434b_9425_cf9f_d337_4583, 0x6266_3735_f7d8_4cd8_af93_1245_21aa_7b49, "Lisinopril", "Blood pressure medication", (2025, 5, 8), DeliveryStatus::Delivered),
    (0xdf95_2b8a_66f3_4550_8602_6091_57a2_f77f, 0xd11b_46c1_dcd6_4572_944f_0458_a489_eab6, "Omeprazole", "Acid reflux relief", (2025, 5, 23), DeliveryStatus::Delivered),
    (0x2b3c_b67d_8b38_4a02_b36b_322c_e56b_a37e, 0xf389_991b_7e81_4884_a3fc_3065_d08d_3c6d, "Metformin", "Diabetes medication", (2025, 5, 21), DeliveryStatus::Shipped),
];

/// Populate every table. Safe to call on a non-empty set of repositories;
/// fixed rows are upserted by id.
pub fn seed(repos: &Repositories, now: DateTime<Utc>) {
    for (id, name, age, phone) in PATIENTS {
        repos.patients.upsert(Patient {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            age,
            phone_number: phone.to_string(),
        });
    }

    for (id, name, specialization) in PROVIDERS {
        let provider = Provider {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            specialization: specialization.to_string(),
        };
        for slot in generate_slots(provider.id, now) {
            repos.slots.upsert(slot);
        }
        repos.providers.upsert(provider);
    }

    for (id, patient_id, name, description, (y, m, d), status) in PRESCRIPTIONS {
        let Some(last_refill_date) = Utc.with_ymd_and_hms(y, m, d, 19, 24, 13).single() else {
            continue;
        };
        repos.prescriptions.upsert(Prescription {
            id: Uuid::from_u128(id),
            patient_id: Uuid::from_u128(patient_id),
            name: name.to_string(),
            description: description.to_string(),
            last_refill_date,
            delivery_status: status,
            next_refill_date: None,
        });
    }

    tracing::info!(
        patients = repos.patients.len(),
        providers = repos.providers.len(),
        slots = repos.slots.len(),
        prescriptions = repos.prescriptions.len(),
        "Seeded domain repositories"
    );
}

/// One-hour slots during IST working hours for the next
/// [`SLOT_DAYS_AHEAD`] days, stored in UTC
fn generate_slots(provider_id: Uuid, now: DateTime<Utc>) -> Vec<Slot> {
    let today = now.with_timezone(&ist()).date_naive();
    let mut slots = Vec::with_capacity(SLOT_HOURS.len() * 15);

    for day in 0..SLOT_DAYS_AHEAD {
        let date = today + Duration::days(day);
        for hour in SLOT_HOURS {
            let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
                continue;
            };
            let Some(start) = ist().from_local_datetime(&date.and_time(time)).single() else {
                continue;
            };
            let start = start.with_timezone(&Utc);
            slots.push(Slot {
                id: Uuid::new_v4(),
                provider_id,
                start,
                end: start + Duration::hours(1),
                is_available: true,
            });
        }
    }

    slots
}
