//! Smart slot proposals
//!
//! Surfaces additional off-grid start times that reduce the idle gap left
//! between an existing booking and the next natural grid slot. A proposal
//! qualifies only when the recovered time is worth it and the start stays
//! close enough to the grid to keep the day readable.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CandidateSlot, SlotKey, TimeInterval};

/// Optimizer tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Master switch; disabled yields grid slots only.
    pub enabled: bool,

    /// Minimum idle minutes kept between a booking end and a smart start.
    pub buffer_min: i64,

    /// A residual gap (between buffer end and smart start) must be zero or
    /// at least this many minutes to stay usable.
    pub min_gap_min: i64,

    /// Cap of smart proposals per staff member per hour.
    pub max_smart_slots_per_hour: usize,

    /// Minimum idle-gap reduction versus the nearest natural grid slot.
    pub min_waste_reduction_min: i64,

    /// Maximum distance from the nearest grid line.
    pub max_off_grid_offset_min: i64,

    /// UI granularity divided by this gives the fine engine granularity.
    pub granularity_divisor: i64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_min: 0,
            min_gap_min: 15,
            max_smart_slots_per_hour: 2,
            min_waste_reduction_min: 10,
            max_off_grid_offset_min: 15,
            granularity_divisor: 6,
        }
    }
}

impl OptimizerConfig {
    /// Fine engine granularity for a UI granularity; the divisor must
    /// divide it evenly.
    pub fn fine_granularity_min(&self, ui_granularity_min: i64) -> Option<i64> {
        if self.granularity_divisor <= 0 || ui_granularity_min % self.granularity_divisor != 0 {
            return None;
        }
        Some(ui_granularity_min / self.granularity_divisor)
    }
}

/// Propose off-grid starts that shrink idle gaps behind existing bookings.
///
/// `grid` is the engine output at UI granularity, `fine` the output at the
/// fine granularity; both over the same snapshot. Proposals are tagged
/// `is_smart` and deduplicated against grid starts.
pub fn propose_smart_slots(
    grid: &[CandidateSlot],
    fine: &[CandidateSlot],
    booked: &BTreeMap<String, Vec<TimeInterval>>,
    ui_granularity_min: i64,
    cfg: &OptimizerConfig,
) -> Vec<CandidateSlot> {
    if !cfg.enabled || ui_granularity_min <= 0 {
        return Vec::new();
    }

    let grid_by_staff = by_staff(grid);
    let fine_by_staff = by_staff(fine);
    let grid_starts: HashSet<(String, DateTime<Utc>)> = grid
        .iter()
        .map(|c| (c.staff_id.clone(), c.start))
        .collect();

    let mut proposals: Vec<(i64, CandidateSlot)> = Vec::new();
    let mut seen: HashSet<SlotKey> = HashSet::new();

    for (staff_id, bookings) in booked {
        let Some(staff_grid) = grid_by_staff.get(staff_id.as_str()) else {
            continue;
        };
        let Some(staff_fine) = fine_by_staff.get(staff_id.as_str()) else {
            continue;
        };

        for booking in bookings {
            let target = booking.end + Duration::minutes(cfg.buffer_min);

            // Nearest natural grid slot at or after the boundary; without
            // one there is no waste to measure against.
            let Some(next_grid) = staff_grid.iter().find(|c| c.start >= target) else {
                continue;
            };

            for candidate in staff_fine
                .iter()
                .filter(|c| c.start >= target && c.start < next_grid.start)
            {
                if grid_starts.contains(&(candidate.staff_id.clone(), candidate.start)) {
                    continue;
                }
                if seen.contains(&candidate.key) {
                    continue;
                }

                let waste_reduction = (next_grid.start - candidate.start).num_minutes();
                if waste_reduction < cfg.min_waste_reduction_min {
                    continue;
                }

                let offset = grid_offset_min(candidate.start, next_grid.start, ui_granularity_min);
                if offset > cfg.max_off_grid_offset_min {
                    continue;
                }

                let residual = (candidate.start - target).num_minutes();
                if residual != 0 && residual < cfg.min_gap_min {
                    continue;
                }

                seen.insert(candidate.key.clone());
                let mut smart = (*candidate).clone();
                smart.is_smart = true;
                proposals.push((waste_reduction, smart));
            }
        }
    }

    cap_per_staff_hour(proposals, cfg.max_smart_slots_per_hour)
}

/// Distance in minutes from `start` to the nearest grid line, where the
/// grid phase is taken from a known grid-aligned start.
fn grid_offset_min(start: DateTime<Utc>, grid_anchor: DateTime<Utc>, granularity_min: i64) -> i64 {
    let delta = (grid_anchor - start).num_minutes().rem_euclid(granularity_min);
    delta.min(granularity_min - delta)
}

fn by_staff(candidates: &[CandidateSlot]) -> HashMap<&str, Vec<&CandidateSlot>> {
    let mut map: HashMap<&str, Vec<&CandidateSlot>> = HashMap::new();
    for c in candidates {
        map.entry(c.staff_id.as_str()).or_default().push(c);
    }
    for list in map.values_mut() {
        list.sort_by_key(|c| c.start);
    }
    map
}

/// Keep the highest-value proposals per staff member per hour.
fn cap_per_staff_hour(
    mut proposals: Vec<(i64, CandidateSlot)>,
    cap: usize,
) -> Vec<CandidateSlot> {
    proposals.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.start.cmp(&b.1.start)));

    let mut taken: HashMap<(String, DateTime<Utc>), usize> = HashMap::new();
    let mut out = Vec::new();
    for (_, slot) in proposals {
        let hour = slot
            .start
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .unwrap_or(slot.start);
        let bucket = taken.entry((slot.staff_id.clone(), hour)).or_insert(0);
        if *bucket < cap {
            *bucket += 1;
            out.push(slot);
        }
    }
    out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.staff_id.cmp(&b.staff_id)));
    out
}

/// Merge grid and smart candidates, deduplicating by slot key.
/// Grid-native entries win over smart entries for the same key.
pub fn merge_candidates(
    grid: Vec<CandidateSlot>,
    smart: Vec<CandidateSlot>,
) -> Vec<CandidateSlot> {
    let grid_keys: HashSet<SlotKey> = grid.iter().map(|c| c.key.clone()).collect();

    let mut out = grid;
    let mut smart_seen = HashSet::new();
    for slot in smart {
        if grid_keys.contains(&slot.key) || !smart_seen.insert(slot.key.clone()) {
            continue;
        }
        out.push(slot);
    }
    out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.staff_id.cmp(&b.staff_id)));
    out
}
