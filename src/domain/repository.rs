//! In-memory repositories for domain records
//!
//! Constructed once at startup and shared by reference with the tool
//! executor. Each table is independently locked; no operation spans two
//! tables under one lock.

use super::{Appointment, Patient, Prescription, Provider, Slot};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// A record addressable by primary key
pub trait Record: Clone {
    fn key(&self) -> Uuid;
}

impl Record for Patient {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Record for Provider {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Record for Slot {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Record for Appointment {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Record for Prescription {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// A single keyed table
pub struct Table<T: Record> {
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Record> Table<T> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, T>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, T>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a row
    pub fn upsert(&self, row: T) {
        self.write().insert(row.key(), row);
    }

    pub fn get(&self, id: Uuid) -> Option<T> {
        self.read().get(&id).cloned()
    }

    /// Mutate a row in place under the table's write lock
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.write().get_mut(&id).map(f)
    }

    #[allow(dead_code)] // Table API completeness; used in tests
    pub fn remove(&self, id: Uuid) -> Option<T> {
        self.write().remove(&id)
    }

    /// Rows matching a predicate, in no particular order
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.read().values().filter(|row| pred(row)).cloned().collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }
}

/// All domain tables
#[derive(Default)]
pub struct Repositories {
    pub patients: Table<Patient>,
    pub providers: Table<Provider>,
    pub slots: Table<Slot>,
    pub appointments: Table<Appointment>,
    pub prescriptions: Table<Prescription>,
}

impl Repositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Providers ordered by name
    pub fn providers_by_name(&self) -> Vec<Provider> {
        let mut providers = self.providers.all();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        providers
    }

    /// A provider's slots ordered by start time
    pub fn slots_for_provider(&self, provider_id: Uuid) -> Vec<Slot> {
        let mut slots = self.slots.filter(|s| s.provider_id == provider_id);
        slots.sort_by_key(|s| s.start);
        slots
    }

    /// A patient's appointments ordered by booking time
    pub fn appointments_for_patient(&self, patient_id: Uuid) -> Vec<Appointment> {
        let mut appointments = self.appointments.filter(|a| a.patient_id == patient_id);
        appointments.sort_by_key(|a| a.created_at);
        appointments
    }

    /// A patient's prescriptions ordered by name
    pub fn prescriptions_for_patient(&self, patient_id: Uuid) -> Vec<Prescription> {
        let mut prescriptions = self.prescriptions.filter(|p| p.patient_id == patient_id);
        prescriptions.sort_by(|a, b| a.name.cmp(&b.name));
        prescriptions
    }

    /// Flip a slot's availability. Returns false if the slot does not exist.
    pub fn set_slot_available(&self, slot_id: Uuid, available: bool) -> bool {
        self.slots
            .update(slot_id, |slot| slot.is_available = available)
            .is_some()
    }

    /// Take an available slot atomically. `None` if the slot does not
    /// exist, `Some(false)` if someone else already holds it.
    pub fn reserve_slot(&self, slot_id: Uuid) -> Option<bool> {
        self.slots
            .update(slot_id, |slot| std::mem::replace(&mut slot.is_available, false))
    }
}
