//! Serve command: run the booking API server

use std::sync::Arc;

use anyhow::Result;

use crate::availability::AvailabilityService;
use crate::booking::{
    BookingService, BookingStore, MemoryBookingStore, PgBookingStore, StaffRotator,
};
use crate::config::Config;
use crate::hold::HoldManager;
use crate::notifications::{EventDispatcher, EventSink, WebhookSink};
use crate::server::{ApiServer, AppState};

/// Run the API server until a shutdown signal arrives.
///
/// `memory_store` swaps PostgreSQL for the in-memory booking store; meant
/// for demos, never for multi-process deployments.
pub async fn run(config: Config, memory_store: bool) -> Result<()> {
    if let Err(e) = crate::metrics::init_metrics() {
        tracing::warn!(error = %e, "metrics initialization failed, continuing without metrics");
    }

    let handles = super::build_sources(&config)?;
    let resolver = super::build_resolver(&config, &handles);

    let store: Arc<dyn BookingStore> = if memory_store {
        tracing::warn!("using the in-memory booking store; bookings are not durable");
        Arc::new(MemoryBookingStore::new())
    } else {
        let store = PgBookingStore::new(&config.pg_config()).await?;
        store.init_schema().await?;
        Arc::new(store)
    };

    let holds = Arc::new(HoldManager::connect_or_degraded(&config.hold_config()).await);
    let rotator = StaffRotator::new(holds.shared_pool(), config.redis.key_prefix.clone());

    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    if let Some(webhook) = &config.webhook {
        sinks.push(Arc::new(WebhookSink::new(webhook.clone())?));
    }
    let events = EventDispatcher::new(sinks);

    let availability = Arc::new(AvailabilityService::new(
        handles.clone(),
        store.clone(),
        resolver.clone(),
        config.engine.clone(),
        config.optimizer.clone(),
    ));
    let booking = Arc::new(BookingService::new(
        handles,
        store,
        resolver,
        rotator,
        config.claims.clone(),
        config.engine.clone(),
        events,
    ));

    let state = AppState::new(availability, booking, holds);
    let server = ApiServer::new(config, state)?;

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
