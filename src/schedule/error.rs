//! Error types for the schedule module

use std::fmt;

/// Result type for schedule resolution operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Schedule-resolution errors
#[derive(Debug)]
pub enum ScheduleError {
    /// Request window is inverted, empty or too large
    InvalidWindow { reason: String },

    /// Day window minutes are out of range or inverted
    InvalidDayWindow { start_min: u32, end_min: u32 },

    /// Location has no schedule definition
    LocationNotFound { location_id: String },

    /// Shift-plan source failed for a staff member
    ShiftPlanUnavailable { staff_id: String, reason: String },

    /// Time-off source failed for a staff member
    TimeOffUnavailable { staff_id: String, reason: String },

    /// A collaborator fetch exceeded the request deadline
    FetchTimeout { staff_id: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindow { reason } => {
                write!(f, "Invalid request window: {}", reason)
            }
            Self::InvalidDayWindow { start_min, end_min } => {
                write!(
                    f,
                    "Invalid day window {}..{} (minutes since midnight, start < end <= 1440)",
                    start_min, end_min
                )
            }
            Self::LocationNotFound { location_id } => {
                write!(f, "No schedule for location: {}", location_id)
            }
            Self::ShiftPlanUnavailable { staff_id, reason } => {
                write!(f, "Shift plan unavailable for staff '{}': {}", staff_id, reason)
            }
            Self::TimeOffUnavailable { staff_id, reason } => {
                write!(f, "Time-offs unavailable for staff '{}': {}", staff_id, reason)
            }
            Self::FetchTimeout { staff_id } => {
                write!(f, "Schedule fetch timed out for staff '{}'", staff_id)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

impl ScheduleError {
    pub fn invalid_window(reason: impl Into<String>) -> Self {
        Self::InvalidWindow {
            reason: reason.into(),
        }
    }

    pub fn shift_plan_unavailable(staff_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShiftPlanUnavailable {
            staff_id: staff_id.into(),
            reason: reason.into(),
        }
    }

    pub fn time_off_unavailable(staff_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TimeOffUnavailable {
            staff_id: staff_id.into(),
            reason: reason.into(),
        }
    }

    /// Errors that degrade a single staff member rather than the request
    pub fn is_per_staff(&self) -> bool {
        matches!(
            self,
            Self::ShiftPlanUnavailable { .. }
                | Self::TimeOffUnavailable { .. }
                | Self::FetchTimeout { .. }
        )
    }
}
