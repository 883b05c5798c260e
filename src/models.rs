//! Core data structures for availability computation and booking
//!
//! Everything in this module is a plain value type: intervals, slot
//! identities, service step specifications and the durable booking records.
//! Computation over these types lives in [`crate::schedule`],
//! [`crate::availability`] and [`crate::booking`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

// ============================================================================
// Time Intervals
// ============================================================================

/// Half-open time interval `[start, end)` in absolute time.
///
/// Adjacent intervals (`a.end == b.start`) do not overlap; this is the
/// contract every conflict check in the engine relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Create an interval. Returns `None` when `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create an interval from a start and a duration in minutes.
    pub fn with_duration(start: DateTime<Utc>, minutes: i64) -> Option<Self> {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// Interval length in whole minutes.
    pub fn duration_min(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Half-open overlap test. Adjacency is not a conflict.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `instant` falls inside `[start, end)`.
    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether `other` is entirely inside this interval.
    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with another interval, if non-empty.
    pub fn intersect(&self, other: &TimeInterval) -> Option<TimeInterval> {
        TimeInterval::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Clip this interval to a window. Alias for [`Self::intersect`] that
    /// reads better at call sites.
    pub fn clip(&self, window: &TimeInterval) -> Option<TimeInterval> {
        self.intersect(window)
    }

    /// Interval difference: this interval minus all `blocked` intervals.
    ///
    /// The blocked list does not need to be sorted or disjoint. The result
    /// is ordered and disjoint.
    pub fn subtract_all(&self, blocked: &[TimeInterval]) -> Vec<TimeInterval> {
        let mut relevant: Vec<TimeInterval> = blocked
            .iter()
            .filter(|b| b.overlaps(self))
            .copied()
            .collect();
        relevant.sort_by_key(|b| b.start);

        let mut out = Vec::new();
        let mut cursor = self.start;
        for b in relevant {
            if b.start > cursor {
                if let Some(iv) = TimeInterval::new(cursor, b.start.min(self.end)) {
                    out.push(iv);
                }
            }
            cursor = cursor.max(b.end);
            if cursor >= self.end {
                break;
            }
        }
        if let Some(iv) = TimeInterval::new(cursor, self.end) {
            out.push(iv);
        }
        out
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

/// Sort a list of intervals and coalesce overlapping or adjacent entries.
pub fn normalize_intervals(mut intervals: Vec<TimeInterval>) -> Vec<TimeInterval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|iv| iv.start);

    let mut out: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match out.last_mut() {
            Some(last) if iv.start <= last.end => {
                last.end = last.end.max(iv.end);
            }
            _ => out.push(iv),
        }
    }
    out
}

// ============================================================================
// Slot Identity
// ============================================================================

/// Deterministic, versioned identity of a candidate slot.
///
/// A slot key is identity, not storage: it is recomputed from
/// `(location, staff, start)` on every availability request and must
/// round-trip through its textual encoding without loss. Version-prefixed
/// so a cross-deploy format change is an explicit parse failure instead of
/// silent corruption.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    location_id: String,
    staff_id: String,
    start: DateTime<Utc>,
}

const SLOT_KEY_VERSION: &str = "v1";

impl SlotKey {
    /// Build a slot key. Ids must be non-empty and must not contain the
    /// `:` separator.
    pub fn new(
        location_id: impl Into<String>,
        staff_id: impl Into<String>,
        start: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let location_id = location_id.into();
        let staff_id = staff_id.into();
        validate_key_segment("location id", &location_id)?;
        validate_key_segment("staff id", &staff_id)?;
        Ok(Self {
            location_id,
            staff_id,
            start,
        })
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn staff_id(&self) -> &str {
        &self.staff_id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Re-key the same slot time onto a different staff member.
    pub fn with_staff(&self, staff_id: impl Into<String>) -> Result<Self, Error> {
        Self::new(self.location_id.clone(), staff_id, self.start)
    }

    /// Canonical textual encoding: `v1:<location>:<staff>:<unix-seconds>`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            SLOT_KEY_VERSION,
            self.location_id,
            self.staff_id,
            self.start.timestamp()
        )
    }
}

fn validate_key_segment(what: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation(format!("{what} must not be empty")));
    }
    if value.contains(':') {
        return Err(Error::validation(format!(
            "{what} '{value}' must not contain ':'"
        )));
    }
    Ok(())
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for SlotKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(Error::validation(format!("malformed slot key '{s}'")));
        }
        if parts[0] != SLOT_KEY_VERSION {
            return Err(Error::validation(format!(
                "unsupported slot key version '{}'",
                parts[0]
            )));
        }
        let seconds: i64 = parts[3]
            .parse()
            .map_err(|_| Error::validation(format!("invalid slot key timestamp '{}'", parts[3])))?;
        let start = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
            Error::validation(format!("slot key timestamp out of range '{}'", parts[3]))
        })?;
        SlotKey::new(parts[1], parts[2], start)
    }
}

impl Serialize for SlotKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Service Steps
// ============================================================================

/// One ordered step of a service.
///
/// Steps are laid out back to back: step *n+1* starts where step *n* ends.
/// A step that does not require staff still occupies the customer's time
/// (e.g. color processing) but leaves the staff member free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStepSpec {
    pub service_id: String,

    /// Step length in minutes.
    pub duration_min: i64,

    /// Whether the assigned staff member must be free for the step span.
    pub requires_staff: bool,

    /// Resources of which at least one must be free for the step span.
    /// `None` means the step needs no resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_resources: Option<Vec<String>>,
}

impl ServiceStepSpec {
    pub fn new(service_id: impl Into<String>, duration_min: i64, requires_staff: bool) -> Self {
        Self {
            service_id: service_id.into(),
            duration_min,
            requires_staff,
            allowed_resources: None,
        }
    }

    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.allowed_resources = Some(resources);
        self
    }
}

/// Total span in minutes of a step sequence.
pub fn total_duration_min(steps: &[ServiceStepSpec]) -> i64 {
    steps.iter().map(|s| s.duration_min).sum()
}

// ============================================================================
// Candidate Slots
// ============================================================================

/// Concrete placement of one step inside a candidate slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStep {
    pub service_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A bookable `(staff, time-range)` pairing produced by the engine.
///
/// Candidates are computed per request and discarded; only the key is
/// meaningful across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    #[serde(rename = "slot_key")]
    pub key: SlotKey,
    pub staff_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub steps: Vec<SlotStep>,
    #[serde(default)]
    pub is_smart: bool,
}

impl CandidateSlot {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start,
            end: self.end,
        }
    }
}

// ============================================================================
// Holds
// ============================================================================

/// Short-lived, token-guarded soft reservation of one slot key.
///
/// Advisory only: the booking claim's unique constraint is the real
/// serialization point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub slot_key: SlotKey,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Booking Claims
// ============================================================================

/// Claim row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Confirmed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Confirmed => "confirmed",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "confirmed" => ClaimStatus::Confirmed,
            _ => ClaimStatus::Pending,
        })
    }
}

/// Durable claim over a slot, unique on `(location_id, slot_key)`.
///
/// The unique constraint on this row is the only durable lock in the
/// system; holds merely reduce the chance of ever hitting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingClaim {
    pub id: Uuid,
    pub location_id: String,
    pub slot_key: SlotKey,
    pub idempotency_key: Option<String>,
    pub status: ClaimStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookingClaim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ClaimStatus::Pending && self.expires_at <= now
    }
}

// ============================================================================
// Appointments
// ============================================================================

/// Appointment lifecycle status. Mutation past `Confirmed` happens in
/// status-change operations outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Confirmed,
        })
    }
}

/// Customer contact details captured at booking time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One booked step: a service span assigned to a staff member.
///
/// Spans with `requires_staff = false` record processing time that leaves
/// the staff member bookable; only staff-occupying spans participate in
/// overlap checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentItem {
    pub id: Uuid,
    pub service_id: String,
    pub staff_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_requires_staff")]
    pub requires_staff: bool,
}

fn default_requires_staff() -> bool {
    true
}

impl AppointmentItem {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start,
            end: self.end,
        }
    }
}

/// A committed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub location_id: String,
    pub slot_key: SlotKey,
    pub staff_id: String,
    pub customer: CustomerDetails,
    #[serde(default)]
    pub consents: Vec<String>,
    pub confirmation_code: String,
    pub status: AppointmentStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<AppointmentItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, hour, min, 0).unwrap()
    }

    fn iv(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeInterval {
        TimeInterval::new(at(h1, m1), at(h2, m2)).unwrap()
    }

    #[test]
    fn test_interval_rejects_empty() {
        assert!(TimeInterval::new(at(10, 0), at(10, 0)).is_none());
        assert!(TimeInterval::new(at(11, 0), at(10, 0)).is_none());
    }

    #[test]
    fn test_overlap_half_open() {
        let a = iv(9, 0, 10, 0);
        let b = iv(10, 0, 11, 0);
        let c = iv(9, 30, 10, 30);

        // Adjacency is not a conflict
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));

        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_intersect() {
        let a = iv(9, 0, 11, 0);
        let b = iv(10, 0, 12, 0);
        assert_eq!(a.intersect(&b), Some(iv(10, 0, 11, 0)));

        let c = iv(11, 0, 12, 0);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_subtract_all_middle() {
        let open = iv(9, 0, 12, 0);
        let blocked = vec![iv(10, 0, 10, 30)];

        let free = open.subtract_all(&blocked);
        assert_eq!(free, vec![iv(9, 0, 10, 0), iv(10, 30, 12, 0)]);
    }

    #[test]
    fn test_subtract_all_unsorted_overlapping_blocks() {
        let open = iv(9, 0, 17, 0);
        let blocked = vec![iv(13, 0, 14, 0), iv(9, 0, 9, 30), iv(13, 30, 15, 0)];

        let free = open.subtract_all(&blocked);
        assert_eq!(free, vec![iv(9, 30, 13, 0), iv(15, 0, 17, 0)]);
    }

    #[test]
    fn test_subtract_all_fully_blocked() {
        let open = iv(9, 0, 12, 0);
        let blocked = vec![iv(8, 0, 13, 0)];
        assert!(open.subtract_all(&blocked).is_empty());
    }

    #[test]
    fn test_subtract_all_no_blocks() {
        let open = iv(9, 0, 12, 0);
        assert_eq!(open.subtract_all(&[]), vec![open]);
    }

    #[test]
    fn test_normalize_merges_adjacent() {
        let merged =
            normalize_intervals(vec![iv(10, 0, 11, 0), iv(9, 0, 10, 0), iv(14, 0, 15, 0)]);
        assert_eq!(merged, vec![iv(9, 0, 11, 0), iv(14, 0, 15, 0)]);
    }

    #[test]
    fn test_slot_key_round_trip() {
        let key = SlotKey::new("downtown", "alice", at(9, 30)).unwrap();
        let encoded = key.encode();
        let parsed: SlotKey = encoded.parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.start(), at(9, 30));
        assert_eq!(parsed.location_id(), "downtown");
        assert_eq!(parsed.staff_id(), "alice");
    }

    #[test]
    fn test_slot_key_rejects_separator_in_ids() {
        assert!(SlotKey::new("down:town", "alice", at(9, 0)).is_err());
        assert!(SlotKey::new("downtown", "", at(9, 0)).is_err());
    }

    #[test]
    fn test_slot_key_rejects_unknown_version() {
        let key = SlotKey::new("downtown", "alice", at(9, 0)).unwrap();
        let tampered = key.encode().replacen("v1", "v9", 1);
        assert!(tampered.parse::<SlotKey>().is_err());
    }

    #[test]
    fn test_slot_key_rejects_malformed() {
        assert!("v1:downtown:alice".parse::<SlotKey>().is_err());
        assert!("v1:downtown:alice:not-a-number".parse::<SlotKey>().is_err());
        assert!("".parse::<SlotKey>().is_err());
    }

    #[test]
    fn test_slot_key_serde_as_string() {
        let key = SlotKey::new("downtown", "alice", at(9, 0)).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.encode()));

        let back: SlotKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_slot_key_with_staff() {
        let key = SlotKey::new("downtown", "alice", at(9, 0)).unwrap();
        let rekeyed = key.with_staff("bob").unwrap();
        assert_eq!(rekeyed.staff_id(), "bob");
        assert_eq!(rekeyed.start(), key.start());
    }

    #[test]
    fn test_total_duration() {
        let steps = vec![
            ServiceStepSpec::new("cut", 30, true),
            ServiceStepSpec::new("color", 45, false),
        ];
        assert_eq!(total_duration_min(&steps), 75);
    }

    #[test]
    fn test_claim_expiry() {
        let claim = BookingClaim {
            id: Uuid::new_v4(),
            location_id: "downtown".to_string(),
            slot_key: SlotKey::new("downtown", "alice", at(9, 0)).unwrap(),
            idempotency_key: None,
            status: ClaimStatus::Pending,
            expires_at: at(9, 5),
            created_at: at(9, 0),
        };

        assert!(!claim.is_expired(at(9, 4)));
        assert!(claim.is_expired(at(9, 5)));

        let confirmed = BookingClaim {
            status: ClaimStatus::Confirmed,
            ..claim
        };
        // Confirmed claims never expire
        assert!(!confirmed.is_expired(at(23, 0)));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(
            "pending".parse::<ClaimStatus>().unwrap(),
            ClaimStatus::Pending
        );
        assert_eq!(
            "confirmed".parse::<ClaimStatus>().unwrap(),
            ClaimStatus::Confirmed
        );
        assert_eq!(
            "cancelled".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Cancelled
        );
        assert_eq!(AppointmentStatus::Confirmed.as_str(), "confirmed");
    }
}
