//! Booking store abstraction
//!
//! The claim protocol runs against a [`BookingStore`]: PostgreSQL in
//! production ([`crate::booking::postgres::PgBookingStore`]) and an
//! in-memory implementation with identical protocol semantics for tests
//! and demo deployments ([`crate::booking::memory::MemoryBookingStore`]).
//!
//! Both implement the same ordering: sweep expired claims, insert the
//! claim row first, map a unique violation to an idempotent replay or a
//! conflict, check overlaps against committed items, and commit claim and
//! appointment together or not at all.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Appointment, CustomerDetails, SlotKey, TimeInterval};

/// Injected claim lifecycle policy.
///
/// How long a pending claim shields a slot, and which rows the lazy sweep
/// may delete, are business policy rather than engine logic; both derive
/// from this one injected value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimPolicy {
    /// Lifetime of a pending claim in seconds.
    pub claim_ttl_secs: u64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self { claim_ttl_secs: 120 }
    }
}

impl ClaimPolicy {
    /// Expiry stamp for a claim created at `now`.
    pub fn claim_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.claim_ttl_secs as i64)
    }

    /// Pending claims expiring at or before this instant may be swept.
    pub fn sweep_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }
}

/// One item of an appointment about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointmentItem {
    pub service_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whether the span occupies the staff member; processing-only spans
    /// stay out of overlap checks.
    pub requires_staff: bool,
}

/// A fully validated appointment ready for the claim protocol. The staff
/// id is the slot's own resolved staff, never a client-supplied override.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub location_id: String,
    pub slot_key: SlotKey,
    pub staff_id: String,
    pub customer: CustomerDetails,
    pub consents: Vec<String>,
    pub idempotency_key: Option<String>,
    pub items: Vec<NewAppointmentItem>,
}

/// How a booking attempt resolved.
#[derive(Debug, Clone)]
pub enum BookingOutcome {
    /// A new appointment was committed.
    Created(Appointment),
    /// An identical earlier submission already committed; returned
    /// unchanged.
    Replayed(Appointment),
}

impl BookingOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            BookingOutcome::Created(a) | BookingOutcome::Replayed(a) => a,
        }
    }

    pub fn was_replayed(&self) -> bool {
        matches!(self, BookingOutcome::Replayed(_))
    }
}

/// Committed-bookings store: the single source of truth for conflict
/// detection and the durable end of the claim protocol.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Delete expired, unconfirmed claims for a location. Returns the
    /// number of rows removed.
    async fn sweep_expired_claims(
        &self,
        location_id: &str,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Run the full claim protocol for one booking.
    ///
    /// Exactly one of: a committed appointment, an idempotent replay of an
    /// earlier one, or a definitive retryable error. Never a partial state.
    async fn claim_and_book(
        &self,
        booking: &NewAppointment,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome>;

    /// Committed booking intervals per staff member within a window.
    async fn committed_intervals(
        &self,
        location_id: &str,
        window: &TimeInterval,
    ) -> Result<BTreeMap<String, Vec<TimeInterval>>>;

    /// Count of committed items per staff member starting within the given
    /// (local-day) interval.
    async fn day_load(
        &self,
        location_id: &str,
        day: &TimeInterval,
    ) -> Result<HashMap<String, i64>>;

    /// Look up a committed appointment by idempotency key.
    async fn appointment_by_idempotency(
        &self,
        location_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Appointment>>;
}

/// Deterministic customer-facing confirmation code for an appointment id.
pub fn confirmation_code(appointment_id: &Uuid) -> String {
    let digest = Sha256::digest(appointment_id.as_bytes());
    let mut code = String::with_capacity(8);
    // Map bytes onto an unambiguous uppercase alphabet
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    for byte in digest.iter().take(8) {
        code.push(ALPHABET[(*byte as usize) % ALPHABET.len()] as char);
    }
    code
}
