//! CLI command implementations
//!
//! - [`serve`] - run the booking API server
//! - [`availability`] - one-shot availability query against fixture sources
//! - [`sweep`] - prune expired booking claims

pub mod availability;
pub mod serve;
pub mod sweep;

use std::sync::Arc;

use crate::config::Config;
use crate::schedule::ScheduleResolver;
use crate::sources::{FixtureSet, MemorySources, SourceHandles};

/// Build collaborator source handles from the configured fixture file, or
/// an empty set when none is configured.
pub(crate) fn build_sources(config: &Config) -> anyhow::Result<SourceHandles> {
    let sources = match &config.fixtures_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading collaborator fixtures");
            MemorySources::from_file(path)?
        }
        None => {
            tracing::warn!("no fixture file configured; collaborator sources are empty");
            MemorySources::new(FixtureSet::default())
        }
    };
    Ok(sources.into_handles())
}

/// Build the schedule resolver over a set of source handles.
pub(crate) fn build_resolver(config: &Config, handles: &SourceHandles) -> Arc<ScheduleResolver> {
    Arc::new(ScheduleResolver::new(
        handles.shift_plan.clone(),
        handles.time_off.clone(),
        config.resolver.clone(),
    ))
}
