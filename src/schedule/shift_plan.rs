//! Shift-plan day classification
//!
//! The shift-plan source delivers one entry per staff member per day with a
//! free-form label plus optional working hours. Labels classify into three
//! kinds: absence days are excluded from availability unless explicitly
//! marked holiday-available, in which case the location's base hours apply.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DayWindow;

/// Classified meaning of one shift-plan day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDayKind {
    /// Staff works the given window that day.
    Working(DayWindow),
    /// Staff is absent; the day is excluded.
    Absence,
    /// Absence-type day explicitly marked as available; the location's
    /// base hours apply.
    HolidayAvailable,
}

/// Raw shift-plan entry as delivered by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPlanEntry {
    pub staff_id: String,
    pub date: NaiveDate,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_min: Option<u32>,
}

impl ShiftPlanEntry {
    /// Classify this entry's label into a [`ShiftDayKind`].
    pub fn classify(&self) -> ShiftDayKind {
        classify_shift_label(self.label.as_str(), self.start_min, self.end_min)
    }
}

/// Classify a shift-plan day label.
///
/// Unrecognized labels with working hours attached count as working days;
/// unrecognized labels without hours count as absence (fail-closed).
pub fn classify_shift_label(
    label: &str,
    start_min: Option<u32>,
    end_min: Option<u32>,
) -> ShiftDayKind {
    let normalized = label.trim().to_lowercase();

    match normalized.as_str() {
        "holiday-available" | "holiday_available" | "standby" => {
            return ShiftDayKind::HolidayAvailable;
        }
        "absence" | "off" | "vacation" | "sick" | "holiday" | "leave" => {
            return ShiftDayKind::Absence;
        }
        _ => {}
    }

    match (start_min, end_min) {
        (Some(start), Some(end)) if start < end && end <= 1440 => {
            ShiftDayKind::Working(DayWindow {
                start_min: start,
                end_min: end,
            })
        }
        _ => ShiftDayKind::Absence,
    }
}
