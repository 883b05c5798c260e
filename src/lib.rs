//! tempora - Service Booking Engine
//!
//! Availability computation and concurrency-safe booking for
//! multi-location service businesses: customers pick a service and time,
//! staff work fixed or shift-plan-driven hours, and a slot is never booked
//! twice even under concurrent and duplicate requests.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core value types (intervals, slot keys, appointments)
//! - [`schedule`] - Schedule resolution into per-staff open intervals
//! - [`availability`] - Candidate slot generation and smart slot proposals
//! - [`hold`] - Token-guarded advisory slot holds (Redis)
//! - [`booking`] - The claim protocol and staff rotation (PostgreSQL)
//! - [`sources`] - Collaborator interfaces and fixture-backed sources
//! - [`server`] - HTTP API surface
//! - [`notifications`] - Fire-and-forget booking event dispatch
//!
//! # Example
//!
//! ```no_run
//! use tempora::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     tempora::commands::serve::run(config, false).await?;
//!     Ok(())
//! }
//! ```

pub mod availability;
pub mod booking;
pub mod commands;
pub mod config;
pub mod error;
pub mod hold;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod schedule;
pub mod server;
pub mod sources;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::availability::{AvailabilityRequest, AvailabilityService, OptimizerConfig};
    pub use crate::booking::{
        BookingOutcome, BookingRequest, BookingService, BookingStore, ClaimPolicy,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::hold::HoldManager;
    pub use crate::models::{CandidateSlot, ServiceStepSpec, SlotKey, TimeInterval};
    pub use crate::schedule::ScheduleResolver;
}

// Direct re-exports for convenience
pub use models::{CandidateSlot, ServiceStepSpec, SlotKey, TimeInterval};
