//! In-memory booking store
//!
//! Mirrors the PostgreSQL store's claim protocol semantics over a mutex:
//! claim-insert-first, unique conflict resolved to replay or conflict,
//! in-"transaction" overlap check, all-or-nothing commit. Used by tests
//! (including the concurrency properties) and by demo deployments without
//! a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Appointment, AppointmentItem, AppointmentStatus, BookingClaim, ClaimStatus, TimeInterval,
};

use super::store::{
    confirmation_code, BookingOutcome, BookingStore, ClaimPolicy, NewAppointment,
};

#[derive(Default)]
struct Inner {
    /// Claims keyed by `(location_id, encoded slot key)`; the map key is
    /// the unique constraint.
    claims: HashMap<(String, String), BookingClaim>,
    appointments: Vec<Appointment>,
}

/// Mutex-guarded implementation of [`BookingStore`].
#[derive(Default)]
pub struct MemoryBookingStore {
    inner: Mutex<Inner>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed appointments (test helper).
    pub fn appointment_count(&self) -> usize {
        self.inner.lock().unwrap().appointments.len()
    }

    /// Number of claim rows, confirmed included (test helper).
    pub fn claim_count(&self) -> usize {
        self.inner.lock().unwrap().claims.len()
    }

    fn find_by_idempotency(
        appointments: &[Appointment],
        location_id: &str,
        idempotency_key: &str,
    ) -> Option<Appointment> {
        appointments
            .iter()
            .find(|a| {
                a.location_id == location_id
                    && a.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .cloned()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn sweep_expired_claims(
        &self,
        location_id: &str,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff = policy.sweep_cutoff(now);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.claims.len();
        inner.claims.retain(|(loc, _), claim| {
            loc != location_id || claim.status == ClaimStatus::Confirmed || claim.expires_at > cutoff
        });
        Ok((before - inner.claims.len()) as u64)
    }

    async fn claim_and_book(
        &self,
        booking: &NewAppointment,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.sweep_expired_claims(&booking.location_id, policy, now)
            .await?;

        let mut inner = self.inner.lock().unwrap();
        let claim_key = (booking.location_id.clone(), booking.slot_key.encode());

        // Insert-first: the claim map entry is the serialization point.
        if inner.claims.contains_key(&claim_key) {
            if let Some(key) = &booking.idempotency_key {
                if let Some(existing) =
                    Self::find_by_idempotency(&inner.appointments, &booking.location_id, key)
                {
                    return Ok(BookingOutcome::Replayed(existing));
                }
            }
            return Err(Error::conflict(format!(
                "slot '{}' is already claimed",
                booking.slot_key
            )));
        }

        let claim = BookingClaim {
            id: Uuid::new_v4(),
            location_id: booking.location_id.clone(),
            slot_key: booking.slot_key.clone(),
            idempotency_key: booking.idempotency_key.clone(),
            status: ClaimStatus::Pending,
            expires_at: policy.claim_expires_at(now),
            created_at: now,
        };
        inner.claims.insert(claim_key.clone(), claim);

        // Idempotency uniqueness on (location, key): a different slot key
        // with the same idempotency key replays the original booking.
        if let Some(key) = &booking.idempotency_key {
            if let Some(existing) =
                Self::find_by_idempotency(&inner.appointments, &booking.location_id, key)
            {
                inner.claims.remove(&claim_key); // roll the claim back
                return Ok(BookingOutcome::Replayed(existing));
            }
        }

        // Overlap check against committed staff-occupying items, same
        // "transaction"
        let conflict = inner.appointments.iter().any(|a| {
            a.location_id == booking.location_id
                && a.status == AppointmentStatus::Confirmed
                && a.items.iter().any(|item| {
                    item.requires_staff
                        && item.staff_id == booking.staff_id
                        && booking.items.iter().any(|new| {
                            new.requires_staff
                                && TimeInterval::new(new.start, new.end)
                                    .map(|iv| iv.overlaps(&item.interval()))
                                    .unwrap_or(false)
                        })
                })
        });
        if conflict {
            inner.claims.remove(&claim_key); // roll the claim back
            return Err(Error::conflict(format!(
                "staff '{}' already has a booking overlapping '{}'",
                booking.staff_id, booking.slot_key
            )));
        }

        let appointment_id = Uuid::new_v4();
        let appointment = Appointment {
            id: appointment_id,
            location_id: booking.location_id.clone(),
            slot_key: booking.slot_key.clone(),
            staff_id: booking.staff_id.clone(),
            customer: booking.customer.clone(),
            consents: booking.consents.clone(),
            confirmation_code: confirmation_code(&appointment_id),
            status: AppointmentStatus::Confirmed,
            idempotency_key: booking.idempotency_key.clone(),
            created_at: now,
            items: booking
                .items
                .iter()
                .map(|item| AppointmentItem {
                    id: Uuid::new_v4(),
                    service_id: item.service_id.clone(),
                    staff_id: booking.staff_id.clone(),
                    start: item.start,
                    end: item.end,
                    requires_staff: item.requires_staff,
                })
                .collect(),
        };

        inner.appointments.push(appointment.clone());
        if let Some(claim) = inner.claims.get_mut(&claim_key) {
            claim.status = ClaimStatus::Confirmed;
        }

        Ok(BookingOutcome::Created(appointment))
    }

    async fn committed_intervals(
        &self,
        location_id: &str,
        window: &TimeInterval,
    ) -> Result<BTreeMap<String, Vec<TimeInterval>>> {
        let inner = self.inner.lock().unwrap();
        let mut out: BTreeMap<String, Vec<TimeInterval>> = BTreeMap::new();

        for appointment in inner
            .appointments
            .iter()
            .filter(|a| a.location_id == location_id && a.status == AppointmentStatus::Confirmed)
        {
            for item in appointment.items.iter().filter(|i| i.requires_staff) {
                let iv = item.interval();
                if iv.overlaps(window) {
                    out.entry(item.staff_id.clone()).or_default().push(iv);
                }
            }
        }
        for intervals in out.values_mut() {
            intervals.sort_by_key(|iv| iv.start);
        }
        Ok(out)
    }

    async fn day_load(
        &self,
        location_id: &str,
        day: &TimeInterval,
    ) -> Result<HashMap<String, i64>> {
        let inner = self.inner.lock().unwrap();
        let mut loads: HashMap<String, i64> = HashMap::new();

        for appointment in inner
            .appointments
            .iter()
            .filter(|a| a.location_id == location_id && a.status == AppointmentStatus::Confirmed)
        {
            for item in &appointment.items {
                if day.contains_instant(item.start) {
                    *loads.entry(item.staff_id.clone()).or_insert(0) += 1;
                }
            }
        }
        Ok(loads)
    }

    async fn appointment_by_idempotency(
        &self,
        location_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Appointment>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::find_by_idempotency(
            &inner.appointments,
            location_id,
            idempotency_key,
        ))
    }
}
