//! Availability command: one-shot query against fixture sources

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::availability::{AvailabilityRequest, AvailabilityService};
use crate::booking::MemoryBookingStore;
use crate::config::Config;

/// Query parameters for the one-shot availability command.
pub struct AvailabilityArgs {
    pub location_id: String,
    pub from: String,
    pub to: String,
    pub service_ids: Vec<String>,
    pub staff_id: Option<String>,
    pub granularity_min: Option<i64>,
}

/// Run one availability query against the configured fixtures and print
/// the result as JSON.
pub async fn run(config: Config, args: AvailabilityArgs) -> Result<()> {
    let handles = super::build_sources(&config)?;
    let resolver = super::build_resolver(&config, &handles);

    let service = AvailabilityService::new(
        handles,
        Arc::new(MemoryBookingStore::new()),
        resolver,
        config.engine.clone(),
        config.optimizer.clone(),
    );

    let request = AvailabilityRequest {
        location_id: args.location_id,
        from: parse_instant(&args.from)?,
        to: parse_instant(&args.to)?,
        service_ids: args.service_ids,
        staff_id: args.staff_id,
        granularity_min: args.granularity_min,
    };

    let response = service.query(&request).await?;

    tracing::info!(
        slots = response.slots.len(),
        warnings = response.warnings.len(),
        "availability computed"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 timestamp '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant() {
        let parsed = parse_instant("2026-08-10T09:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-10T09:00:00+00:00");

        assert!(parse_instant("next tuesday").is_err());
    }
}
