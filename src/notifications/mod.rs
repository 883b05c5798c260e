//! Booking event dispatch
//!
//! Downstream collaborators (notification rendering, audit, sync) consume
//! booking events fire-and-forget; delivery failures are logged and never
//! affect the booking outcome.

pub mod webhook;

pub use webhook::{WebhookConfig, WebhookSink};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event emitted after a booking commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    AppointmentCreated {
        appointment_id: Uuid,
        location_id: String,
        staff_id: String,
        confirmation_code: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        service_ids: Vec<String>,
    },
}

/// Delivery target for booking events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    async fn deliver(&self, event: &BookingEvent) -> anyhow::Result<()>;
}

/// Fans events out to all configured sinks without blocking the caller.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Dispatch an event to every sink on background tasks.
    pub fn dispatch(&self, event: BookingEvent) {
        for sink in &self.sinks {
            let sink = sink.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&event).await {
                    tracing::warn!(sink = %sink.name(), error = %e, "event delivery failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        delivered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn deliver(&self, _event: &BookingEvent) -> anyhow::Result<()> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> BookingEvent {
        BookingEvent::AppointmentCreated {
            appointment_id: Uuid::new_v4(),
            location_id: "downtown".to_string(),
            staff_id: "alice".to_string(),
            confirmation_code: "ABCD2345".to_string(),
            starts_at: Utc::now(),
            ends_at: Utc::now(),
            service_ids: vec!["cut".to_string()],
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_sinks() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let dispatcher = EventDispatcher::new(vec![
            Arc::new(CountingSink {
                delivered: delivered.clone(),
            }),
            Arc::new(CountingSink {
                delivered: delivered.clone(),
            }),
        ]);

        dispatcher.dispatch(event());

        // Delivery happens on spawned tasks
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["type"], "appointment_created");
        assert_eq!(json["location_id"], "downtown");
    }
}
