//! Availability computation
//!
//! Orchestrates the full read path: resolve per-staff open intervals,
//! generate grid-aligned candidates, propose smart off-grid slots, and
//! merge the results. Everything here is computed per request against a
//! snapshot of the committed bookings and discarded; the hold and claim
//! layers own consistency from that point on.
//!
//! - [`engine`] - grid-aligned candidate generation
//! - [`optimizer`] - smart off-grid slot proposals

pub mod engine;
pub mod optimizer;

pub use engine::{generate_candidates, StaffTimeline};
pub use optimizer::{merge_candidates, propose_smart_slots, OptimizerConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::store::BookingStore;
use crate::error::{Error, Result};
use crate::models::{CandidateSlot, ServiceStepSpec, SlotKey, SlotStep, TimeInterval};
use crate::schedule::{ResolveWarning, ScheduleResolver, StaffMember};
use crate::sources::SourceHandles;

/// Engine-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Slot granularity used when the request does not specify one.
    pub default_granularity_min: i64,

    /// Upper bound on chained services per request.
    pub max_services_per_request: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_granularity_min: 30,
            max_services_per_request: 5,
        }
    }
}

/// Availability query input.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRequest {
    pub location_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub service_ids: Vec<String>,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub granularity_min: Option<i64>,
}

/// One slot as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot_key: SlotKey,
    pub staff_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Span the booking will reserve, including non-staff processing steps.
    pub reserved_from: DateTime<Utc>,
    pub reserved_to: DateTime<Utc>,
    pub services: Vec<SlotStep>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_smart: bool,
}

impl From<CandidateSlot> for SlotView {
    fn from(slot: CandidateSlot) -> Self {
        Self {
            slot_key: slot.key,
            staff_id: slot.staff_id,
            start: slot.start,
            end: slot.end,
            reserved_from: slot.start,
            reserved_to: slot.end,
            services: slot.steps,
            is_smart: slot.is_smart,
        }
    }
}

/// Availability query result.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub slots: Vec<SlotView>,
    pub warnings: Vec<ResolveWarning>,
}

/// Full availability read path: Resolver, Engine, Optimizer, merge.
pub struct AvailabilityService {
    sources: SourceHandles,
    store: Arc<dyn BookingStore>,
    resolver: Arc<ScheduleResolver>,
    engine: EngineConfig,
    optimizer: OptimizerConfig,
}

impl AvailabilityService {
    pub fn new(
        sources: SourceHandles,
        store: Arc<dyn BookingStore>,
        resolver: Arc<ScheduleResolver>,
        engine: EngineConfig,
        optimizer: OptimizerConfig,
    ) -> Self {
        Self {
            sources,
            store,
            resolver,
            engine,
            optimizer,
        }
    }

    /// Compute candidate slots for a request.
    pub async fn query(&self, req: &AvailabilityRequest) -> Result<AvailabilityResponse> {
        let window = TimeInterval::new(req.from, req.to)
            .ok_or_else(|| Error::validation("window is empty or inverted"))?;
        self.resolver.validate_window(&window)?;

        let granularity = req
            .granularity_min
            .unwrap_or(self.engine.default_granularity_min);
        if granularity <= 0 || granularity > 240 {
            return Err(Error::validation(format!(
                "granularity {granularity} out of range (1..=240 minutes)"
            )));
        }

        let steps = crate::sources::chained_steps(
            &self.sources.catalog,
            &req.service_ids,
            self.engine.max_services_per_request,
        )
        .await?;
        let schedule = self
            .sources
            .schedule
            .location_schedule(&req.location_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("location '{}'", req.location_id)))?;

        let roster = self.eligible_roster(req).await?;

        // Committed bookings are the conflict source of truth for this
        // snapshot; a later booking attempt re-reads them transactionally.
        let booked = self
            .store
            .committed_intervals(&req.location_id, &window)
            .await?;

        // Bookings go to the engine as collision input rather than being
        // subtracted here: subtracting them would re-anchor the slot grid
        // at each booking's end and leave the optimizer nothing to recover.
        let resolved = self
            .resolver
            .resolve(&schedule, &roster, &window, &BTreeMap::new())
            .await;

        let staff: BTreeMap<String, StaffTimeline> = resolved
            .windows
            .iter()
            .map(|(id, open)| {
                (
                    id.clone(),
                    StaffTimeline {
                        open: open.clone(),
                        booked: booked.get(id).cloned().unwrap_or_default(),
                    },
                )
            })
            .collect();

        let resources = self.resource_intervals(&steps, &window).await;

        let grid = generate_candidates(&req.location_id, &steps, &staff, &resources, granularity)?;

        let smart = match self.optimizer.fine_granularity_min(granularity) {
            Some(fine_granularity) if self.optimizer.enabled => {
                let fine = generate_candidates(
                    &req.location_id,
                    &steps,
                    &staff,
                    &resources,
                    fine_granularity,
                )?;
                propose_smart_slots(&grid, &fine, &booked, granularity, &self.optimizer)
            }
            _ => Vec::new(),
        };

        let merged = merge_candidates(grid, smart);
        crate::metrics::record_availability_query(merged.len());

        Ok(AvailabilityResponse {
            slots: merged.into_iter().map(SlotView::from).collect(),
            warnings: resolved.warnings,
        })
    }

    /// Roster filtered by the optional staff pin and by service capability.
    async fn eligible_roster(&self, req: &AvailabilityRequest) -> Result<Vec<StaffMember>> {
        let roster = self
            .sources
            .schedule
            .staff_for_location(&req.location_id)
            .await?;

        let roster: Vec<StaffMember> = match &req.staff_id {
            Some(pinned) => {
                let member = roster
                    .into_iter()
                    .find(|m| &m.id == pinned)
                    .ok_or_else(|| Error::not_found(format!("staff '{pinned}'")))?;
                vec![member]
            }
            None => roster,
        };

        Ok(roster
            .into_iter()
            .filter(|m| m.can_perform_all(&req.service_ids))
            .collect())
    }

    /// Free intervals of every resource referenced by the step chain.
    /// A failed registry lookup leaves the resource fully busy.
    async fn resource_intervals(
        &self,
        steps: &[ServiceStepSpec],
        window: &TimeInterval,
    ) -> BTreeMap<String, Vec<TimeInterval>> {
        let mut resource_ids: Vec<&String> = steps
            .iter()
            .filter_map(|s| s.allowed_resources.as_ref())
            .flatten()
            .collect();
        resource_ids.sort();
        resource_ids.dedup();

        let mut out = BTreeMap::new();
        for id in resource_ids {
            match self.sources.resources.free_intervals(id, window).await {
                Ok(free) => {
                    out.insert(id.clone(), free);
                }
                Err(e) => {
                    tracing::warn!(resource_id = %id, error = %e, "resource registry lookup failed, treating resource as busy");
                    out.insert(id.clone(), Vec::new());
                }
            }
        }
        out
    }
}
