//! Prometheus metrics for the booking engine
//!
//! Call [`init_metrics`] once at startup to register all metrics. If
//! registration fails, metric operations become no-ops so the engine keeps
//! working without observability.

use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Encoder,
    Histogram, IntCounter, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all engine metrics
struct EngineMetrics {
    availability_queries: IntCounter,
    availability_slots: Histogram,
    holds_acquired: IntCounter,
    hold_conflicts: IntCounter,
    bookings: CounterVec,
    claims_swept: IntCounter,
}

/// Global storage for engine metrics
static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        availability_queries: register_int_counter!(
            "tempora_availability_queries_total",
            "Total availability queries served"
        )?,
        availability_slots: register_histogram!(
            "tempora_availability_slots",
            "Candidate slots returned per availability query",
            vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
        )?,
        holds_acquired: register_int_counter!(
            "tempora_holds_acquired_total",
            "Total holds successfully acquired"
        )?,
        hold_conflicts: register_int_counter!(
            "tempora_hold_conflicts_total",
            "Total hold acquisitions rejected because the slot was held"
        )?,
        bookings: register_counter_vec!(
            "tempora_bookings_total",
            "Booking attempts by outcome",
            &["outcome"]
        )?,
        claims_swept: register_int_counter!(
            "tempora_claims_swept_total",
            "Total expired claim rows removed by the lazy sweep"
        )?,
    };

    ENGINE_METRICS.set(metrics).ok();
    Ok(())
}

/// Record a served availability query and its slot count
pub fn record_availability_query(slot_count: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.availability_queries.inc();
        m.availability_slots.observe(slot_count as f64);
    }
}

/// Record a hold acquisition attempt
pub fn record_hold(acquired: bool) {
    if let Some(m) = ENGINE_METRICS.get() {
        if acquired {
            m.holds_acquired.inc();
        } else {
            m.hold_conflicts.inc();
        }
    }
}

/// Record a booking attempt outcome: created, replayed, conflict or error
pub fn record_booking(outcome: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.bookings.with_label_values(&[outcome]).inc();
    }
}

/// Record swept claim rows
pub fn record_claims_swept(count: u64) {
    if count > 0 {
        if let Some(m) = ENGINE_METRICS.get() {
            m.claims_swept.inc_by(count);
        }
    }
}

/// Encode the current metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_record() {
        init_metrics().unwrap();
        // Second init is a no-op, not an error
        init_metrics().unwrap();

        record_availability_query(12);
        record_hold(true);
        record_hold(false);
        record_booking("created");
        record_booking("conflict");
        record_claims_swept(3);

        let encoded = encode_metrics().unwrap();
        assert!(encoded.contains("tempora_availability_queries_total"));
        assert!(encoded.contains("tempora_bookings_total"));
    }

    #[test]
    fn test_record_without_init_is_noop() {
        // Even if registration never happened in this process, recording
        // must not panic.
        record_availability_query(1);
        record_booking("created");
    }
}
