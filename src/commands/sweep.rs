//! Sweep command: prune expired booking claims

use anyhow::Result;
use chrono::Utc;

use crate::booking::{BookingStore, PgBookingStore};
use crate::config::Config;

/// Delete expired, unconfirmed claims for a location.
///
/// The claim protocol already sweeps lazily before each insert attempt;
/// this command exists for operators who want the table pruned on a
/// schedule as well.
pub async fn run(config: Config, location_id: String) -> Result<()> {
    let store = PgBookingStore::new(&config.pg_config()).await?;
    store.init_schema().await?;

    let removed = store
        .sweep_expired_claims(&location_id, &config.claims, Utc::now())
        .await?;
    crate::metrics::record_claims_swept(removed);

    tracing::info!(location_id = %location_id, removed = removed, "sweep complete");
    println!("removed {removed} expired claim(s) for location '{location_id}'");
    Ok(())
}
