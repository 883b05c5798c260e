//! Booking: the claim protocol and its orchestration
//!
//! Converting a selected slot into exactly one persisted appointment, even
//! under concurrent and duplicate submissions:
//!
//! - [`store`] - the [`store::BookingStore`] trait, claim policy, outcome types
//! - [`postgres`] - production PostgreSQL store
//! - [`memory`] - in-memory store with identical protocol semantics
//! - [`rotation`] - load-based round-robin staff assignment
//!
//! [`BookingService`] validates the request, resolves the authoritative
//! staff binding (consulting the rotator when the customer did not pin a
//! staff member), runs the claim protocol and emits booking events.

pub mod memory;
pub mod postgres;
pub mod rotation;
pub mod store;

pub use memory::MemoryBookingStore;
pub use postgres::{PgBookingStore, PgStoreConfig};
pub use rotation::StaffRotator;
pub use store::{
    confirmation_code, BookingOutcome, BookingStore, ClaimPolicy, NewAppointment,
    NewAppointmentItem,
};

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{AppointmentStatus, CustomerDetails, ServiceStepSpec, SlotKey, TimeInterval};
use crate::notifications::{BookingEvent, EventDispatcher};
use crate::schedule::{DayWindow, LocationSchedule, ScheduleResolver};
use crate::sources::SourceHandles;

/// Booking submission as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub slot_key: SlotKey,

    /// Advisory only; a mismatch against the slot's own staff is a
    /// validation error, never an override.
    #[serde(default)]
    pub staff_id: Option<String>,

    pub service_ids: Vec<String>,
    pub customer: CustomerDetails,

    #[serde(default)]
    pub consents: Vec<String>,

    /// The customer did not pin a staff member; assignment may rotate the
    /// slot onto any eligible, available staff.
    #[serde(default)]
    pub any_staff: bool,
}

/// Successful booking response.
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub confirmation_code: String,
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

/// Validates and executes booking submissions.
pub struct BookingService {
    sources: SourceHandles,
    store: Arc<dyn BookingStore>,
    resolver: Arc<ScheduleResolver>,
    rotator: StaffRotator,
    policy: ClaimPolicy,
    engine: EngineConfig,
    events: EventDispatcher,
}

impl BookingService {
    pub fn new(
        sources: SourceHandles,
        store: Arc<dyn BookingStore>,
        resolver: Arc<ScheduleResolver>,
        rotator: StaffRotator,
        policy: ClaimPolicy,
        engine: EngineConfig,
        events: EventDispatcher,
    ) -> Self {
        Self {
            sources,
            store,
            resolver,
            rotator,
            policy,
            engine,
            events,
        }
    }

    /// Execute one booking submission.
    ///
    /// Deterministic per idempotency key: duplicate submissions resolve to
    /// the same appointment, never a second one.
    pub async fn book(
        &self,
        req: &BookingRequest,
        idempotency_key: Option<String>,
    ) -> Result<BookingConfirmation> {
        if let Some(key) = &idempotency_key {
            if key.is_empty() || key.len() > 128 {
                return Err(Error::validation(
                    "idempotency key must be 1..=128 characters",
                ));
            }
        }

        let location_id = req.slot_key.location_id().to_string();
        let schedule = self
            .sources
            .schedule
            .location_schedule(&location_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("location '{location_id}'")))?;

        let steps = crate::sources::chained_steps(
            &self.sources.catalog,
            &req.service_ids,
            self.engine.max_services_per_request,
        )
        .await?;

        // The slot's own resolved staff is authoritative; the client's
        // staff id is only a validation signal.
        let mut slot_key = req.slot_key.clone();
        if let Some(advisory) = &req.staff_id {
            if advisory != slot_key.staff_id() {
                return Err(Error::validation(format!(
                    "staff '{}' does not match the selected slot",
                    advisory
                )));
            }
        }

        if req.any_staff {
            let chosen = self
                .rotate_staff(&schedule, &req.service_ids, &steps, &slot_key)
                .await?;
            slot_key = slot_key.with_staff(chosen)?;
        }

        let staff_id = slot_key.staff_id().to_string();
        let items = layout_items(&slot_key, &steps);

        let booking = NewAppointment {
            location_id: location_id.clone(),
            slot_key,
            staff_id,
            customer: req.customer.clone(),
            consents: req.consents.clone(),
            idempotency_key,
            items,
        };

        let outcome = self
            .store
            .claim_and_book(&booking, &self.policy, Utc::now())
            .await;

        match &outcome {
            Ok(o) => crate::metrics::record_booking(if o.was_replayed() {
                "replayed"
            } else {
                "created"
            }),
            Err(Error::Conflict(_)) => crate::metrics::record_booking("conflict"),
            Err(_) => crate::metrics::record_booking("error"),
        }

        let outcome = outcome?;
        let appointment = outcome.appointment();

        if !outcome.was_replayed() {
            self.events.dispatch(BookingEvent::AppointmentCreated {
                appointment_id: appointment.id,
                location_id: appointment.location_id.clone(),
                staff_id: appointment.staff_id.clone(),
                confirmation_code: appointment.confirmation_code.clone(),
                starts_at: appointment.slot_key.start(),
                ends_at: appointment
                    .items
                    .last()
                    .map(|i| i.end)
                    .unwrap_or_else(|| appointment.slot_key.start()),
                service_ids: req.service_ids.clone(),
            });
        }

        Ok(BookingConfirmation {
            appointment_id: appointment.id,
            confirmation_code: appointment.confirmation_code.clone(),
            status: appointment.status,
            replayed: outcome.was_replayed(),
        })
    }

    /// Pick a staff member for an unpinned booking: eligible for the
    /// services, open for the whole slot span, lowest same-day load,
    /// rotated round-robin.
    async fn rotate_staff(
        &self,
        schedule: &LocationSchedule,
        service_ids: &[String],
        steps: &[ServiceStepSpec],
        slot_key: &SlotKey,
    ) -> Result<String> {
        let location_id = slot_key.location_id();
        let start = slot_key.start();
        let total = crate::models::total_duration_min(steps);
        let span = TimeInterval::with_duration(start, total)
            .ok_or_else(|| Error::validation("slot span is empty"))?;

        let roster: Vec<_> = self
            .sources
            .schedule
            .staff_for_location(location_id)
            .await?
            .into_iter()
            .filter(|m| m.can_perform_all(service_ids))
            .collect();

        let booked = self.store.committed_intervals(location_id, &span).await?;
        let resolved = self.resolver.resolve(schedule, &roster, &span, &booked).await;

        // Conservative availability: the whole span must be open
        let candidates: Vec<String> = resolved
            .windows
            .iter()
            .filter(|(_, open)| open.iter().any(|iv| iv.contains(&span)))
            .map(|(id, _)| id.clone())
            .collect();

        let date = schedule.local_date(start);
        let day = schedule
            .to_absolute(
                date,
                &DayWindow {
                    start_min: 0,
                    end_min: 1440,
                },
            )
            .unwrap_or(span);
        let loads = self.store.day_load(location_id, &day).await?;

        self.rotator
            .select(location_id, service_ids, date, &candidates, &loads)
            .await
            .ok_or_else(|| {
                Error::conflict("no staff member is available for the selected time")
            })
    }
}

/// Lay the step chain out sequentially from the slot start.
fn layout_items(slot_key: &SlotKey, steps: &[ServiceStepSpec]) -> Vec<NewAppointmentItem> {
    let mut cursor = slot_key.start();
    let mut items = Vec::with_capacity(steps.len());
    for step in steps {
        let end = cursor + Duration::minutes(step.duration_min);
        items.push(NewAppointmentItem {
            service_id: step.service_id.clone(),
            start: cursor,
            end,
            requires_staff: step.requires_staff,
        });
        cursor = end;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ResolverConfig, StaffMember, WeeklyRule};
    use crate::sources::{FixtureSet, MemorySources, ServiceFixture, ServiceStepFixture};
    use chrono::{TimeZone, Utc, Weekday};

    fn at(hour: u32, min: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, hour, min, 0).unwrap()
    }

    fn fixtures() -> FixtureSet {
        FixtureSet {
            locations: vec![LocationSchedule {
                location_id: "downtown".to_string(),
                utc_offset_min: 0,
                weekly: vec![WeeklyRule {
                    weekday: Weekday::Mon,
                    windows: vec![DayWindow {
                        start_min: 540,
                        end_min: 1020,
                    }],
                }],
                overrides: vec![],
                shift_plan_mode: false,
            }],
            staff: vec![
                StaffMember {
                    id: "alice".to_string(),
                    location_id: "downtown".to_string(),
                    display_name: "Alice".to_string(),
                    service_ids: vec![],
                },
                StaffMember {
                    id: "bob".to_string(),
                    location_id: "downtown".to_string(),
                    display_name: "Bob".to_string(),
                    service_ids: vec![],
                },
            ],
            services: vec![ServiceFixture {
                id: "cut".to_string(),
                steps: vec![ServiceStepFixture {
                    duration_min: 30,
                    requires_staff: true,
                    allowed_resources: None,
                }],
            }],
            ..FixtureSet::default()
        }
    }

    fn service(store: Arc<dyn BookingStore>) -> BookingService {
        let handles = MemorySources::new(fixtures()).into_handles();
        let resolver = Arc::new(ScheduleResolver::new(
            handles.shift_plan.clone(),
            handles.time_off.clone(),
            ResolverConfig::default(),
        ));
        BookingService::new(
            handles,
            store,
            resolver,
            StaffRotator::new(None, "tempora"),
            ClaimPolicy::default(),
            EngineConfig::default(),
            EventDispatcher::default(),
        )
    }

    fn request(staff: &str, hour: u32, min: u32) -> BookingRequest {
        BookingRequest {
            slot_key: SlotKey::new("downtown", staff, at(hour, min)).unwrap(),
            staff_id: None,
            service_ids: vec!["cut".to_string()],
            customer: CustomerDetails {
                name: "Jo Customer".to_string(),
                email: None,
                phone: None,
            },
            consents: vec![],
            any_staff: false,
        }
    }

    #[tokio::test]
    async fn test_book_success() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let confirmation = svc.book(&request("alice", 9, 0), None).await.unwrap();
        assert_eq!(confirmation.status, AppointmentStatus::Confirmed);
        assert!(!confirmation.replayed);
        assert_eq!(confirmation.confirmation_code.len(), 8);
    }

    #[tokio::test]
    async fn test_mismatched_advisory_staff_rejected() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let mut req = request("alice", 9, 0);
        req.staff_id = Some("bob".to_string());

        let result = svc.book(&req, None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_matching_advisory_staff_accepted() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let mut req = request("alice", 9, 0);
        req.staff_id = Some("alice".to_string());
        assert!(svc.book(&req, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_service_rejected() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let mut req = request("alice", 9, 0);
        req.service_ids = vec!["massage".to_string()];

        let result = svc.book(&req, None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_idempotent_replay_end_to_end() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let req = request("alice", 9, 0);

        let first = svc.book(&req, Some("k1".to_string())).await.unwrap();
        let second = svc.book(&req, Some("k1".to_string())).await.unwrap();

        assert_eq!(first.appointment_id, second.appointment_id);
        assert_eq!(first.confirmation_code, second.confirmation_code);
        assert!(second.replayed);
    }

    #[tokio::test]
    async fn test_any_staff_rotates_assignment() {
        let store = Arc::new(MemoryBookingStore::new());
        let svc = service(store.clone());

        let mut first = request("alice", 9, 0);
        first.any_staff = true;
        let mut second = request("alice", 10, 0);
        second.any_staff = true;

        svc.book(&first, None).await.unwrap();
        svc.book(&second, None).await.unwrap();

        // Two unpinned bookings spread across the two members
        let day = TimeInterval::new(at(0, 0), at(23, 59)).unwrap();
        let loads = store.day_load("downtown", &day).await.unwrap();
        assert_eq!(loads.get("alice").copied().unwrap_or(0), 1);
        assert_eq!(loads.get("bob").copied().unwrap_or(0), 1);
    }

    #[tokio::test]
    async fn test_any_staff_with_no_availability_conflicts() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        // 20:00 is outside the 09:00-17:00 opening hours
        let mut req = request("alice", 20, 0);
        req.any_staff = true;

        let result = svc.book(&req, None).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_oversized_idempotency_key_rejected() {
        let svc = service(Arc::new(MemoryBookingStore::new()));
        let result = svc
            .book(&request("alice", 9, 0), Some("x".repeat(200)))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_layout_items_sequential() {
        let slot_key = SlotKey::new("downtown", "alice", at(9, 0)).unwrap();
        let steps = vec![
            ServiceStepSpec::new("color", 30, true),
            ServiceStepSpec::new("color", 45, false),
        ];

        let items = layout_items(&slot_key, &steps);
        assert_eq!(items[0].start, at(9, 0));
        assert_eq!(items[0].end, at(9, 30));
        assert_eq!(items[1].start, at(9, 30));
        assert_eq!(items[1].end, at(10, 15));
        assert!(!items[1].requires_staff);
    }
}
