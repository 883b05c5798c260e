//! Candidate slot generation
//!
//! Pure computation over already-fetched data: walks each staff member's
//! open intervals on a grid and lays service steps out sequentially,
//! checking staff bookings and resource availability per step. All interval
//! semantics are half-open; adjacency is never a conflict.

use std::collections::BTreeMap;

use chrono::Duration;

use crate::error::{Error, Result};
use crate::models::{
    total_duration_min, CandidateSlot, ServiceStepSpec, SlotKey, SlotStep, TimeInterval,
};

/// Per-staff input to the engine: open intervals from the resolver plus
/// committed booking intervals.
#[derive(Debug, Clone, Default)]
pub struct StaffTimeline {
    pub open: Vec<TimeInterval>,
    pub booked: Vec<TimeInterval>,
}

/// Generate grid-aligned candidate slots.
///
/// Starts are aligned to `granularity_min` relative to each open interval's
/// start. A start qualifies only if every step can be placed back to back
/// without colliding with the staff member's bookings (for steps requiring
/// staff), without exhausting the open interval, and with at least one
/// allowed resource free for each resource-bound step. Chained multi-service
/// step lists must fit consecutively on a single staff member.
pub fn generate_candidates(
    location_id: &str,
    steps: &[ServiceStepSpec],
    staff: &BTreeMap<String, StaffTimeline>,
    resources: &BTreeMap<String, Vec<TimeInterval>>,
    granularity_min: i64,
) -> Result<Vec<CandidateSlot>> {
    if granularity_min <= 0 {
        return Err(Error::validation(format!(
            "granularity must be positive, got {granularity_min}"
        )));
    }
    let total_min = total_duration_min(steps);
    if total_min <= 0 {
        return Err(Error::validation("service steps have no duration"));
    }

    let grid = Duration::minutes(granularity_min);
    let total = Duration::minutes(total_min);
    let mut candidates = Vec::new();

    for (staff_id, timeline) in staff {
        for interval in &timeline.open {
            let mut start = interval.start;
            while start + total <= interval.end {
                if let Some(placed) = place_steps(start, steps, timeline, interval.end, resources)
                {
                    candidates.push(CandidateSlot {
                        key: SlotKey::new(location_id, staff_id.clone(), start)?,
                        staff_id: staff_id.clone(),
                        start,
                        end: start + total,
                        steps: placed,
                        is_smart: false,
                    });
                }
                start += grid;
            }
        }
    }

    candidates.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.staff_id.cmp(&b.staff_id)));
    Ok(candidates)
}

/// Lay steps out sequentially from `start`. Returns the placed steps, or
/// `None` if any step collides or runs past the interval end.
fn place_steps(
    start: chrono::DateTime<chrono::Utc>,
    steps: &[ServiceStepSpec],
    timeline: &StaffTimeline,
    interval_end: chrono::DateTime<chrono::Utc>,
    resources: &BTreeMap<String, Vec<TimeInterval>>,
) -> Option<Vec<SlotStep>> {
    let mut placed = Vec::with_capacity(steps.len());
    let mut cursor = start;

    for step in steps {
        let end = cursor + Duration::minutes(step.duration_min);
        if end > interval_end {
            return None;
        }
        let span = TimeInterval { start: cursor, end };

        // Steps that occupy the staff member must not collide with existing
        // bookings; steps that only occupy the customer (processing time)
        // leave the staff member free for other work.
        if step.requires_staff && timeline.booked.iter().any(|b| b.overlaps(&span)) {
            return None;
        }

        if let Some(allowed) = &step.allowed_resources {
            let some_resource_free = allowed.iter().any(|r| {
                resources
                    .get(r)
                    .map(|free| free.iter().any(|iv| iv.contains(&span)))
                    .unwrap_or(false)
            });
            if !some_resource_free {
                return None;
            }
        }

        placed.push(SlotStep {
            service_id: step.service_id.clone(),
            start: cursor,
            end,
        });
        cursor = end;
    }

    Some(placed)
}
