//! Common test utilities

use chrono::{DateTime, TimeZone, Utc, Weekday};
use tempora::models::{CustomerDetails, SlotKey, TimeInterval};
use tempora::schedule::{DayWindow, LocationSchedule, StaffMember, WeeklyRule};
use tempora::sources::{FixtureSet, ServiceFixture, ServiceStepFixture};

/// Absolute instant on the reference Monday (2026-08-10, UTC)
pub fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 10, hour, min, 0).unwrap()
}

/// Interval on the reference Monday
#[allow(dead_code)]
pub fn iv(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeInterval {
    TimeInterval::new(at(h1, m1), at(h2, m2)).unwrap()
}

/// A location open Mon 09:00-17:00 with two generalist staff and a
/// 30-minute "cut" service
#[allow(dead_code)]
pub fn fixtures() -> FixtureSet {
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
        staff: vec![staff_member("alice"), staff_member("bob")],
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

#[allow(dead_code)]
pub fn staff_member(id: &str) -> StaffMember {
    StaffMember {
        id: id.to_string(),
        location_id: "downtown".to_string(),
        display_name: id.to_string(),
        service_ids: vec![],
    }
}

#[allow(dead_code)]
pub fn slot_key(staff: &str, hour: u32, min: u32) -> SlotKey {
    SlotKey::new("downtown", staff, at(hour, min)).unwrap()
}

#[allow(dead_code)]
pub fn customer() -> CustomerDetails {
    CustomerDetails {
        name: "Jo Customer".to_string(),
        email: Some("jo@example.com".to_string()),
        phone: None,
    }
}
