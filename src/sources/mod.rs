//! Collaborator interfaces consumed by the engine
//!
//! The engine never talks to admin screens or external systems directly; it
//! consumes them through these traits:
//!
//! - [`ScheduleSource`] - location schedules and the staff roster
//! - [`ShiftPlanSource`] - per-staff, per-day working-hours entries
//! - [`TimeOffSource`] - time-offs and exceptions as blocked intervals
//! - [`ResourceRegistry`] - bookable resource free intervals
//! - [`ServiceCatalog`] - ordered step specifications per service
//!
//! [`MemorySources`] implements all of them over a TOML fixture set for
//! tests, the one-shot CLI and demo deployments. Production deployments
//! plug real adapters in behind the same traits.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ServiceStepSpec, TimeInterval};
use crate::schedule::{LocationSchedule, ShiftPlanEntry, StaffMember};

// ============================================================================
// Traits
// ============================================================================

/// Source of location schedules and staff rosters.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Schedule definition for a location, if the location exists.
    async fn location_schedule(&self, location_id: &str) -> Result<Option<LocationSchedule>>;

    /// Staff roster of a location.
    async fn staff_for_location(&self, location_id: &str) -> Result<Vec<StaffMember>>;
}

/// External per-staff, per-day working-hours source.
#[async_trait]
pub trait ShiftPlanSource: Send + Sync {
    /// Shift-plan entries for one staff member over a set of local dates.
    async fn entries(&self, staff_id: &str, dates: &[NaiveDate]) -> Result<Vec<ShiftPlanEntry>>;
}

/// Time-offs and exceptions, already flattened to blocked intervals.
#[async_trait]
pub trait TimeOffSource: Send + Sync {
    async fn blocked_intervals(
        &self,
        staff_id: &str,
        window: &TimeInterval,
    ) -> Result<Vec<TimeInterval>>;
}

/// Registry of bookable resources (rooms, chairs, devices).
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Free intervals of a resource within a window. Unknown resources are
    /// fully busy.
    async fn free_intervals(
        &self,
        resource_id: &str,
        window: &TimeInterval,
    ) -> Result<Vec<TimeInterval>>;
}

/// Service definitions: ordered step specs per service.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Ordered steps of a service, or `None` for an unknown service.
    async fn service_steps(&self, service_id: &str) -> Result<Option<Vec<ServiceStepSpec>>>;
}

/// Concatenate the ordered steps of all requested services, in request
/// order. Unknown services are a not-found error; an oversized chain is a
/// validation error.
pub async fn chained_steps(
    catalog: &Arc<dyn ServiceCatalog>,
    service_ids: &[String],
    max_services: usize,
) -> Result<Vec<ServiceStepSpec>> {
    if service_ids.is_empty() {
        return Err(Error::validation("at least one service is required"));
    }
    if service_ids.len() > max_services {
        return Err(Error::validation(format!(
            "too many services: {} (maximum {max_services})",
            service_ids.len()
        )));
    }

    let mut steps = Vec::new();
    for service_id in service_ids {
        let service_steps = catalog
            .service_steps(service_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("service '{service_id}'")))?;
        steps.extend(service_steps);
    }
    Ok(steps)
}

// ============================================================================
// Fixture Set
// ============================================================================

/// One service definition in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFixture {
    pub id: String,
    pub steps: Vec<ServiceStepFixture>,
}

/// One step of a fixture service; `service_id` is filled from the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStepFixture {
    pub duration_min: i64,
    #[serde(default = "default_requires_staff")]
    pub requires_staff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_resources: Option<Vec<String>>,
}

fn default_requires_staff() -> bool {
    true
}

/// A time-off or exception entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOffFixture {
    pub staff_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A resource with its busy spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceFixture {
    pub id: String,
    pub location_id: String,
    #[serde(default)]
    pub busy: Vec<BusySpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusySpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Complete collaborator data set, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub locations: Vec<LocationSchedule>,
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub services: Vec<ServiceFixture>,
    #[serde(default)]
    pub time_offs: Vec<TimeOffFixture>,
    #[serde(default)]
    pub shift_entries: Vec<ShiftPlanEntry>,
    #[serde(default)]
    pub resources: Vec<ResourceFixture>,
}

impl FixtureSet {
    /// Load a fixture set from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
        let fixtures: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse fixture file: {}", path.display()))?;
        Ok(fixtures)
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Fixture-backed implementation of every collaborator trait.
///
/// Staff listed in `fail_shift_plan_for` simulate an unreachable shift-plan
/// source so degradation paths can be exercised without a network.
pub struct MemorySources {
    fixtures: FixtureSet,
    fail_shift_plan_for: HashSet<String>,
}

impl MemorySources {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self {
            fixtures,
            fail_shift_plan_for: HashSet::new(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(FixtureSet::from_file(path)?))
    }

    /// Simulate an unreachable shift-plan source for one staff member.
    pub fn with_failing_shift_plan(mut self, staff_id: impl Into<String>) -> Self {
        self.fail_shift_plan_for.insert(staff_id.into());
        self
    }

    /// Wrap into the `Arc<dyn Trait>` handles the services consume.
    pub fn into_handles(self) -> SourceHandles {
        let shared = Arc::new(self);
        SourceHandles {
            schedule: shared.clone(),
            shift_plan: shared.clone(),
            time_off: shared.clone(),
            resources: shared.clone(),
            catalog: shared,
        }
    }
}

/// Bundle of trait-object handles over one source backend.
#[derive(Clone)]
pub struct SourceHandles {
    pub schedule: Arc<dyn ScheduleSource>,
    pub shift_plan: Arc<dyn ShiftPlanSource>,
    pub time_off: Arc<dyn TimeOffSource>,
    pub resources: Arc<dyn ResourceRegistry>,
    pub catalog: Arc<dyn ServiceCatalog>,
}

#[async_trait]
impl ScheduleSource for MemorySources {
    async fn location_schedule(&self, location_id: &str) -> Result<Option<LocationSchedule>> {
        Ok(self
            .fixtures
            .locations
            .iter()
            .find(|l| l.location_id == location_id)
            .cloned())
    }

    async fn staff_for_location(&self, location_id: &str) -> Result<Vec<StaffMember>> {
        Ok(self
            .fixtures
            .staff
            .iter()
            .filter(|s| s.location_id == location_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ShiftPlanSource for MemorySources {
    async fn entries(&self, staff_id: &str, dates: &[NaiveDate]) -> Result<Vec<ShiftPlanEntry>> {
        if self.fail_shift_plan_for.contains(staff_id) {
            return Err(Error::upstream(format!(
                "shift-plan source unreachable for staff '{staff_id}'"
            )));
        }
        Ok(self
            .fixtures
            .shift_entries
            .iter()
            .filter(|e| e.staff_id == staff_id && dates.contains(&e.date))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TimeOffSource for MemorySources {
    async fn blocked_intervals(
        &self,
        staff_id: &str,
        window: &TimeInterval,
    ) -> Result<Vec<TimeInterval>> {
        Ok(self
            .fixtures
            .time_offs
            .iter()
            .filter(|t| t.staff_id == staff_id)
            .filter_map(|t| TimeInterval::new(t.start, t.end))
            .filter(|iv| iv.overlaps(window))
            .collect())
    }
}

#[async_trait]
impl ResourceRegistry for MemorySources {
    async fn free_intervals(
        &self,
        resource_id: &str,
        window: &TimeInterval,
    ) -> Result<Vec<TimeInterval>> {
        let Some(resource) = self.fixtures.resources.iter().find(|r| r.id == resource_id) else {
            // Unknown resources are fully busy
            return Ok(Vec::new());
        };

        let busy: Vec<TimeInterval> = resource
            .busy
            .iter()
            .filter_map(|b| TimeInterval::new(b.start, b.end))
            .collect();
        Ok(window.subtract_all(&busy))
    }
}

#[async_trait]
impl ServiceCatalog for MemorySources {
    async fn service_steps(&self, service_id: &str) -> Result<Option<Vec<ServiceStepSpec>>> {
        let Some(service) = self.fixtures.services.iter().find(|s| s.id == service_id) else {
            return Ok(None);
        };
        Ok(Some(
            service
                .steps
                .iter()
                .map(|step| ServiceStepSpec {
                    service_id: service.id.clone(),
                    duration_min: step.duration_min,
                    requires_staff: step.requires_staff,
                    allowed_resources: step.allowed_resources.clone(),
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixtures() -> FixtureSet {
        FixtureSet {
            locations: vec![LocationSchedule {
                location_id: "downtown".to_string(),
                utc_offset_min: 0,
                weekly: vec![],
                overrides: vec![],
                shift_plan_mode: false,
            }],
            staff: vec![StaffMember {
                id: "alice".to_string(),
                location_id: "downtown".to_string(),
                display_name: "Alice".to_string(),
                service_ids: vec![],
            }],
            services: vec![ServiceFixture {
                id: "cut".to_string(),
                steps: vec![ServiceStepFixture {
                    duration_min: 30,
                    requires_staff: true,
                    allowed_resources: None,
                }],
            }],
            time_offs: vec![],
            shift_entries: vec![],
            resources: vec![ResourceFixture {
                id: "room1".to_string(),
                location_id: "downtown".to_string(),
                busy: vec![BusySpan {
                    start: Utc.with_ymd_and_hms(2026, 8, 10, 10, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2026, 8, 10, 11, 0, 0).unwrap(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_location_lookup() {
        let sources = MemorySources::new(fixtures());
        assert!(sources
            .location_schedule("downtown")
            .await
            .unwrap()
            .is_some());
        assert!(sources.location_schedule("uptown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_service_steps_fill_service_id() {
        let sources = MemorySources::new(fixtures());
        let steps = sources.service_steps("cut").await.unwrap().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].service_id, "cut");
        assert!(sources.service_steps("massage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resource_free_intervals_subtract_busy() {
        let sources = MemorySources::new(fixtures());
        let window = TimeInterval::new(
            Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap(),
        )
        .unwrap();

        let free = sources.free_intervals("room1", &window).await.unwrap();
        assert_eq!(free.len(), 2);
        assert_eq!(free[0].end, Utc.with_ymd_and_hms(2026, 8, 10, 10, 0, 0).unwrap());
        assert_eq!(
            free[1].start,
            Utc.with_ymd_and_hms(2026, 8, 10, 11, 0, 0).unwrap()
        );

        // Unknown resource is fully busy
        assert!(sources
            .free_intervals("room9", &window)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_shift_plan_knob() {
        let sources = MemorySources::new(fixtures()).with_failing_shift_plan("alice");
        let dates = vec![NaiveDate::from_ymd_opt(2026, 8, 10).unwrap()];
        assert!(sources.entries("alice", &dates).await.is_err());
        assert!(sources.entries("bob", &dates).await.is_ok());
    }
}
