//! Schedule resolution pipeline
//!
//! Turns location rules, shift-plan entries, time-offs and committed
//! bookings into per-staff open intervals for a request window. Per-staff
//! collaborator fetches run with bounded fan-out and a request-level
//! timeout; a failed or timed-out fetch marks that staff member fully
//! blocked for the window and surfaces a warning instead of failing the
//! whole request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::models::{normalize_intervals, TimeInterval};
use crate::sources::{ShiftPlanSource, TimeOffSource};

use super::error::{ScheduleError, ScheduleResult};
use super::shift_plan::ShiftDayKind;
use super::{DayWindow, LocationSchedule, StaffMember};

/// Resolver tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Deadline for each staff member's collaborator fetches, in seconds.
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent per-staff fetches.
    pub max_fan_out: usize,

    /// Maximum request window length in days.
    pub max_window_days: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            max_fan_out: 8,
            max_window_days: 35,
        }
    }
}

/// Why a warning was attached to a resolution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Location has no configured opening hours; a synthetic 24/7 schedule
    /// was used.
    SyntheticSchedule,
    /// A staff member's schedule source failed; that staff is treated as
    /// fully blocked for the window.
    StaffDegraded,
}

/// Structured warning surfaced alongside availability results.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    pub kind: WarningKind,
    pub message: String,
}

/// Per-staff open intervals for a window, plus warnings.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAvailability {
    /// Ordered, disjoint open intervals keyed by staff id.
    pub windows: BTreeMap<String, Vec<TimeInterval>>,
    pub warnings: Vec<ResolveWarning>,
}

/// Converts schedule rules and collaborator data into open intervals.
pub struct ScheduleResolver {
    shift_plan: Arc<dyn ShiftPlanSource>,
    time_off: Arc<dyn TimeOffSource>,
    config: ResolverConfig,
}

impl ScheduleResolver {
    pub fn new(
        shift_plan: Arc<dyn ShiftPlanSource>,
        time_off: Arc<dyn TimeOffSource>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            shift_plan,
            time_off,
            config,
        }
    }

    /// Validate a request window against resolver limits.
    pub fn validate_window(&self, window: &TimeInterval) -> ScheduleResult<()> {
        let days = (window.end - window.start).num_days();
        if days > self.config.max_window_days {
            return Err(ScheduleError::invalid_window(format!(
                "window spans {} days, maximum is {}",
                days, self.config.max_window_days
            )));
        }
        Ok(())
    }

    /// Resolve per-staff open intervals for a window.
    ///
    /// `blocked` carries extra per-staff blocked intervals to subtract on
    /// top of time-offs, e.g. committed bookings when the caller wants
    /// net-free time rather than schedule shape.
    pub async fn resolve(
        &self,
        schedule: &LocationSchedule,
        staff: &[StaffMember],
        window: &TimeInterval,
        blocked: &BTreeMap<String, Vec<TimeInterval>>,
    ) -> ResolvedAvailability {
        let mut warnings = Vec::new();

        let dates = schedule.local_dates_in(window);
        let base = self.base_intervals(schedule, &dates, &mut warnings);

        let futs: Vec<BoxFuture<'_, (String, Result<Vec<TimeInterval>, ScheduleError>)>> = staff
            .iter()
            .map(|member| self.resolve_one(schedule, member, &dates, &base, window, blocked).boxed())
            .collect();

        let results: Vec<(String, Result<Vec<TimeInterval>, ScheduleError>)> =
            stream::iter(futs)
                .buffer_unordered(self.config.max_fan_out.max(1))
                .collect()
                .await;

        let mut windows = BTreeMap::new();
        for (staff_id, result) in results {
            match result {
                Ok(open) => {
                    windows.insert(staff_id, open);
                }
                Err(e) => {
                    // Fail-closed: the staff member is fully blocked for the
                    // window rather than shown with possibly wrong hours.
                    tracing::warn!(staff_id = %staff_id, error = %e, "staff schedule degraded");
                    warnings.push(ResolveWarning {
                        staff_id: Some(staff_id),
                        kind: WarningKind::StaffDegraded,
                        message: e.to_string(),
                    });
                }
            }
        }

        ResolvedAvailability { windows, warnings }
    }

    /// Location-level base intervals per local date, override > weekly.
    /// No configured hours at all falls back to an explicit synthetic
    /// 24/7 schedule.
    fn base_intervals(
        &self,
        schedule: &LocationSchedule,
        dates: &[NaiveDate],
        warnings: &mut Vec<ResolveWarning>,
    ) -> HashMap<NaiveDate, Vec<TimeInterval>> {
        let synthetic = !schedule.has_configured_hours();
        if synthetic {
            tracing::warn!(
                location_id = %schedule.location_id,
                "no opening hours configured, using synthetic 24/7 schedule"
            );
            warnings.push(ResolveWarning {
                staff_id: None,
                kind: WarningKind::SyntheticSchedule,
                message: format!(
                    "location '{}' has no configured opening hours; assuming open around the clock",
                    schedule.location_id
                ),
            });
        }

        let mut base = HashMap::new();
        for &date in dates {
            let day_windows = if synthetic {
                vec![DayWindow {
                    start_min: 0,
                    end_min: 1440,
                }]
            } else {
                schedule.base_windows_for(date)
            };
            let intervals: Vec<TimeInterval> = day_windows
                .iter()
                .filter_map(|w| schedule.to_absolute(date, w))
                .collect();
            base.insert(date, intervals);
        }
        base
    }

    async fn resolve_one(
        &self,
        schedule: &LocationSchedule,
        member: &StaffMember,
        dates: &[NaiveDate],
        base: &HashMap<NaiveDate, Vec<TimeInterval>>,
        window: &TimeInterval,
        blocked: &BTreeMap<String, Vec<TimeInterval>>,
    ) -> (String, Result<Vec<TimeInterval>, ScheduleError>) {
        let open = self
            .resolve_staff(schedule, member, dates, base, window, blocked)
            .await;
        (member.id.clone(), open)
    }

    async fn resolve_staff(
        &self,
        schedule: &LocationSchedule,
        member: &StaffMember,
        dates: &[NaiveDate],
        base: &HashMap<NaiveDate, Vec<TimeInterval>>,
        window: &TimeInterval,
        blocked: &BTreeMap<String, Vec<TimeInterval>>,
    ) -> Result<Vec<TimeInterval>, ScheduleError> {
        let deadline = Duration::from_secs(self.config.fetch_timeout_secs);

        // Day-by-day working intervals for this staff member
        let day_intervals = if schedule.shift_plan_mode {
            let entries = tokio::time::timeout(deadline, self.shift_plan.entries(&member.id, dates))
                .await
                .map_err(|_| ScheduleError::FetchTimeout {
                    staff_id: member.id.clone(),
                })?
                .map_err(|e| ScheduleError::shift_plan_unavailable(&member.id, e.to_string()))?;

            self.shift_plan_intervals(schedule, &entries, dates, base)
        } else {
            dates
                .iter()
                .flat_map(|d| base.get(d).cloned().unwrap_or_default())
                .collect()
        };

        // Time-offs and exceptions, single attempt
        let time_offs = tokio::time::timeout(
            deadline,
            self.time_off.blocked_intervals(&member.id, window),
        )
        .await
        .map_err(|_| ScheduleError::FetchTimeout {
            staff_id: member.id.clone(),
        })?
        .map_err(|e| ScheduleError::time_off_unavailable(&member.id, e.to_string()))?;

        let mut unavailable = time_offs;
        if let Some(extra) = blocked.get(&member.id) {
            unavailable.extend_from_slice(extra);
        }

        let mut open = Vec::new();
        for iv in day_intervals {
            if let Some(clipped) = iv.clip(window) {
                open.extend(clipped.subtract_all(&unavailable));
            }
        }
        Ok(normalize_intervals(open))
    }

    /// Apply shift-plan classification: working days use the entry's own
    /// hours bounded by location hours, holiday-available days fall back to
    /// location hours, absence days (and days without an entry) are
    /// excluded.
    fn shift_plan_intervals(
        &self,
        schedule: &LocationSchedule,
        entries: &[crate::schedule::ShiftPlanEntry],
        dates: &[NaiveDate],
        base: &HashMap<NaiveDate, Vec<TimeInterval>>,
    ) -> Vec<TimeInterval> {
        let by_date: HashMap<NaiveDate, &crate::schedule::ShiftPlanEntry> =
            entries.iter().map(|e| (e.date, e)).collect();

        let mut out = Vec::new();
        for &date in dates {
            let Some(entry) = by_date.get(&date) else {
                continue;
            };
            let base_for_day = base.get(&date).cloned().unwrap_or_default();
            match entry.classify() {
                ShiftDayKind::Absence => {}
                ShiftDayKind::HolidayAvailable => out.extend(base_for_day),
                ShiftDayKind::Working(day_window) => {
                    if let Some(shift_iv) = schedule.to_absolute(date, &day_window) {
                        for b in &base_for_day {
                            if let Some(iv) = shift_iv.intersect(b) {
                                out.push(iv);
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{DateOverride, ShiftPlanEntry, WeeklyRule};
    use crate::sources::{FixtureSet, MemorySources, TimeOffFixture};
    use chrono::{TimeZone, Utc, Weekday};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 10).unwrap()
    }

    fn day_window(start_min: u32, end_min: u32) -> DayWindow {
        DayWindow { start_min, end_min }
    }

    fn base_schedule(shift_plan_mode: bool) -> LocationSchedule {
        LocationSchedule {
            location_id: "downtown".to_string(),
            utc_offset_min: 0,
            weekly: vec![WeeklyRule {
                weekday: Weekday::Mon,
                windows: vec![day_window(540, 1020)], // 09:00-17:00
            }],
            overrides: vec![],
            shift_plan_mode,
        }
    }

    fn staff(id: &str) -> StaffMember {
        StaffMember {
            id: id.to_string(),
            location_id: "downtown".to_string(),
            display_name: id.to_string(),
            service_ids: vec![],
        }
    }

    fn window() -> TimeInterval {
        TimeInterval::new(
            Utc.with_ymd_and_hms(2026, 8, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 11, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn resolver(sources: MemorySources) -> ScheduleResolver {
        let handles = sources.into_handles();
        ScheduleResolver::new(handles.shift_plan, handles.time_off, ResolverConfig::default())
    }

    #[tokio::test]
    async fn test_fixed_hours_resolution() {
        let resolver = resolver(MemorySources::new(FixtureSet::default()));
        let resolved = resolver
            .resolve(
                &base_schedule(false),
                &[staff("alice")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        let open = &resolved.windows["alice"];
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].start, Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap());
        assert_eq!(open[0].end, Utc.with_ymd_and_hms(2026, 8, 10, 17, 0, 0).unwrap());
        assert!(resolved.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_override_closes_day() {
        let mut sched = base_schedule(false);
        sched.overrides.push(DateOverride {
            date: monday(),
            windows: vec![],
        });

        let resolver = resolver(MemorySources::new(FixtureSet::default()));
        let resolved = resolver
            .resolve(&sched, &[staff("alice")], &window(), &BTreeMap::new())
            .await;

        assert!(resolved.windows["alice"].is_empty());
    }

    #[tokio::test]
    async fn test_synthetic_schedule_when_unconfigured() {
        let sched = LocationSchedule {
            weekly: vec![],
            ..base_schedule(false)
        };

        let resolver = resolver(MemorySources::new(FixtureSet::default()));
        let resolved = resolver
            .resolve(&sched, &[staff("alice")], &window(), &BTreeMap::new())
            .await;

        // Open for the whole window, and explicitly flagged
        assert_eq!(resolved.windows["alice"], vec![window()]);
        assert!(resolved
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SyntheticSchedule));
    }

    #[tokio::test]
    async fn test_time_off_subtracted() {
        let fixtures = FixtureSet {
            time_offs: vec![TimeOffFixture {
                staff_id: "alice".to_string(),
                start: Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2026, 8, 10, 13, 0, 0).unwrap(),
            }],
            ..FixtureSet::default()
        };

        let resolver = resolver(MemorySources::new(fixtures));
        let resolved = resolver
            .resolve(
                &base_schedule(false),
                &[staff("alice")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        let open = &resolved.windows["alice"];
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].end, Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap());
        assert_eq!(open[1].start, Utc.with_ymd_and_hms(2026, 8, 10, 13, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_booked_intervals_subtracted() {
        let resolver = resolver(MemorySources::new(FixtureSet::default()));
        let mut booked = BTreeMap::new();
        booked.insert(
            "alice".to_string(),
            vec![TimeInterval::new(
                Utc.with_ymd_and_hms(2026, 8, 10, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 8, 10, 10, 30, 0).unwrap(),
            )
            .unwrap()],
        );

        let resolved = resolver
            .resolve(&base_schedule(false), &[staff("alice")], &window(), &booked)
            .await;

        let open = &resolved.windows["alice"];
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].end, Utc.with_ymd_and_hms(2026, 8, 10, 10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_shift_plan_working_day_bounded_by_location() {
        let fixtures = FixtureSet {
            shift_entries: vec![ShiftPlanEntry {
                staff_id: "alice".to_string(),
                date: monday(),
                label: "early".to_string(),
                start_min: Some(480), // 08:00, before opening
                end_min: Some(780),   // 13:00
            }],
            ..FixtureSet::default()
        };

        let resolver = resolver(MemorySources::new(fixtures));
        let resolved = resolver
            .resolve(
                &base_schedule(true),
                &[staff("alice")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        let open = &resolved.windows["alice"];
        assert_eq!(open.len(), 1);
        // Clamped to the location's 09:00 opening
        assert_eq!(open[0].start, Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap());
        assert_eq!(open[0].end, Utc.with_ymd_and_hms(2026, 8, 10, 13, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_shift_plan_absence_excluded() {
        let fixtures = FixtureSet {
            shift_entries: vec![ShiftPlanEntry {
                staff_id: "alice".to_string(),
                date: monday(),
                label: "vacation".to_string(),
                start_min: None,
                end_min: None,
            }],
            ..FixtureSet::default()
        };

        let resolver = resolver(MemorySources::new(fixtures));
        let resolved = resolver
            .resolve(
                &base_schedule(true),
                &[staff("alice")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        assert!(resolved.windows["alice"].is_empty());
    }

    #[tokio::test]
    async fn test_shift_plan_holiday_available_uses_base_hours() {
        let fixtures = FixtureSet {
            shift_entries: vec![ShiftPlanEntry {
                staff_id: "alice".to_string(),
                date: monday(),
                label: "holiday-available".to_string(),
                start_min: None,
                end_min: None,
            }],
            ..FixtureSet::default()
        };

        let resolver = resolver(MemorySources::new(fixtures));
        let resolved = resolver
            .resolve(
                &base_schedule(true),
                &[staff("alice")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        let open = &resolved.windows["alice"];
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].start, Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_failed_staff_degrades_not_fails() {
        let fixtures = FixtureSet {
            shift_entries: vec![ShiftPlanEntry {
                staff_id: "bob".to_string(),
                date: monday(),
                label: "day".to_string(),
                start_min: Some(540),
                end_min: Some(1020),
            }],
            ..FixtureSet::default()
        };
        let sources = MemorySources::new(fixtures).with_failing_shift_plan("alice");

        let resolver = resolver(sources);
        let resolved = resolver
            .resolve(
                &base_schedule(true),
                &[staff("alice"), staff("bob")],
                &window(),
                &BTreeMap::new(),
            )
            .await;

        // Alice is excluded fail-closed, Bob still resolves
        assert!(!resolved.windows.contains_key("alice"));
        assert!(!resolved.windows["bob"].is_empty());
        assert!(resolved
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::StaffDegraded
                && w.staff_id.as_deref() == Some("alice")));
    }

    #[tokio::test]
    async fn test_window_validation() {
        let resolver = resolver(MemorySources::new(FixtureSet::default()));
        let huge = TimeInterval::new(
            Utc.with_ymd_and_hms(2026, 8, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 10, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(resolver.validate_window(&huge).is_err());
        assert!(resolver.validate_window(&window()).is_ok());
    }
}
