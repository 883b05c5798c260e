//! Schedule definitions and resolution
//!
//! Converts location rules (recurring weekly hours plus date overrides),
//! staff shift-plan entries, and time-offs into per-staff open intervals
//! for a request window.
//!
//! - [`resolver`] - the fan-out resolution pipeline
//! - [`shift_plan`] - shift-plan day label classification
//! - [`error`] - schedule-specific error types

pub mod error;
pub mod resolver;
pub mod shift_plan;

pub use error::{ScheduleError, ScheduleResult};
pub use resolver::{ResolveWarning, ResolvedAvailability, ResolverConfig, ScheduleResolver, WarningKind};
pub use shift_plan::{classify_shift_label, ShiftDayKind, ShiftPlanEntry};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::TimeInterval;

// ============================================================================
// Schedule Definitions
// ============================================================================

/// Opening window within one local day, in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start_min: u32,
    pub end_min: u32,
}

impl DayWindow {
    /// Validate bounds: `start < end <= 1440`.
    pub fn validate(&self) -> ScheduleResult<()> {
        if self.start_min >= self.end_min || self.end_min > 1440 {
            return Err(ScheduleError::InvalidDayWindow {
                start_min: self.start_min,
                end_min: self.end_min,
            });
        }
        Ok(())
    }
}

/// Recurring weekly opening rule for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    pub weekday: Weekday,
    pub windows: Vec<DayWindow>,
}

/// Date-specific override. An empty window list means closed that day.
/// Overrides always win over the weekly default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub date: NaiveDate,
    pub windows: Vec<DayWindow>,
}

/// Location-level schedule definition.
///
/// The location time zone is carried as a fixed UTC offset in minutes;
/// all local day windows convert to absolute time through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSchedule {
    pub location_id: String,

    /// Local time = UTC + offset.
    pub utc_offset_min: i32,

    /// Recurring weekly opening hours.
    #[serde(default)]
    pub weekly: Vec<WeeklyRule>,

    /// Date overrides; win over weekly rules.
    #[serde(default)]
    pub overrides: Vec<DateOverride>,

    /// When true, staff hours come from the shift-plan source instead of
    /// the location's base hours.
    #[serde(default)]
    pub shift_plan_mode: bool,
}

impl LocationSchedule {
    /// Whether any opening hours are configured at all.
    pub fn has_configured_hours(&self) -> bool {
        !self.weekly.is_empty() || !self.overrides.is_empty()
    }

    /// Base opening windows for one local date: date override wins over the
    /// weekly default.
    pub fn base_windows_for(&self, date: NaiveDate) -> Vec<DayWindow> {
        if let Some(ov) = self.overrides.iter().find(|o| o.date == date) {
            return ov.windows.clone();
        }
        self.weekly
            .iter()
            .filter(|r| r.weekday == date.weekday())
            .flat_map(|r| r.windows.iter().copied())
            .collect()
    }

    /// Convert a local day window on a local date into an absolute interval.
    pub fn to_absolute(&self, date: NaiveDate, window: &DayWindow) -> Option<TimeInterval> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let offset = Duration::minutes(self.utc_offset_min as i64);
        let start = DateTime::<Utc>::from_naive_utc_and_offset(
            midnight + Duration::minutes(window.start_min as i64) - offset,
            Utc,
        );
        let end = DateTime::<Utc>::from_naive_utc_and_offset(
            midnight + Duration::minutes(window.end_min as i64) - offset,
            Utc,
        );
        TimeInterval::new(start, end)
    }

    /// Local date an absolute instant falls on at this location.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        (instant + Duration::minutes(self.utc_offset_min as i64))
            .naive_utc()
            .date()
    }

    /// Inclusive list of local dates touched by a window.
    pub fn local_dates_in(&self, window: &TimeInterval) -> Vec<NaiveDate> {
        let first = self.local_date(window.start);
        // End is exclusive; an interval ending exactly at local midnight does
        // not touch the next day.
        let last = self.local_date(window.end - Duration::seconds(1));
        let mut dates = Vec::new();
        let mut d = first;
        while d <= last {
            dates.push(d);
            d += Duration::days(1);
        }
        dates
    }
}

/// Roster entry: a staff member attached to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub location_id: String,
    #[serde(default)]
    pub display_name: String,

    /// Services this member can perform; empty means all.
    #[serde(default)]
    pub service_ids: Vec<String>,
}

impl StaffMember {
    /// Whether this member can perform every service in the set.
    pub fn can_perform_all(&self, service_ids: &[String]) -> bool {
        self.service_ids.is_empty()
            || service_ids.iter().all(|s| self.service_ids.contains(s))
    }
}
