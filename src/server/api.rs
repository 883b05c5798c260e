//! REST API handlers for the booking engine
//!
//! Availability is a read; holds are advisory writes against the shared
//! store; bookings run the claim protocol. Errors map to the taxonomy in
//! [`crate::error`].

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::AvailabilityRequest;
use crate::booking::BookingRequest;
use crate::error::Error;
use crate::models::SlotKey;

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub hold_store_available: bool,
}

/// Hold creation request
#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub slot_key: SlotKey,
    /// Display descriptor cached best-effort alongside the hold
    #[serde(default)]
    pub descriptor: Option<serde_json::Value>,
}

/// Hold creation response
#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub slot_key: SlotKey,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Hold release response
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/metrics", get(metrics))
        .route("/api/availability", post(query_availability))
        .route("/api/holds", post(create_hold))
        .route("/api/holds/{slot_key}", delete(release_hold))
        .route("/api/bookings", post(create_booking))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        hold_store_available: state.holds.is_available(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, Error> {
    let body = crate::metrics::encode_metrics()
        .map_err(|e| Error::other(format!("metrics encoding failed: {e}")))?;
    Ok((StatusCode::OK, body))
}

/// Availability query. One staff member's upstream failure degrades that
/// staff to unavailable with a warning; the query itself still succeeds.
async fn query_availability(
    State(state): State<AppState>,
    Json(request): Json<AvailabilityRequest>,
) -> Result<impl IntoResponse, Error> {
    let response = state.availability.query(&request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Create a hold on a slot
async fn create_hold(
    State(state): State<AppState>,
    Json(request): Json<HoldRequest>,
) -> Result<impl IntoResponse, Error> {
    match state.holds.acquire(&request.slot_key).await {
        Some(hold) => {
            crate::metrics::record_hold(true);
            if let Some(descriptor) = &request.descriptor {
                state.holds.store_metadata(&request.slot_key, descriptor).await;
            }
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::success(HoldResponse {
                    slot_key: hold.slot_key,
                    token: hold.token,
                    expires_at: hold.expires_at,
                })),
            ))
        }
        None => {
            crate::metrics::record_hold(false);
            Err(Error::conflict(format!(
                "slot '{}' is already held",
                request.slot_key
            )))
        }
    }
}

/// Release a hold. The token travels in the `X-Hold-Token` header and is
/// the only credential that can release the hold.
async fn release_hold(
    State(state): State<AppState>,
    Path(slot_key): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let slot_key: SlotKey = slot_key.parse()?;
    let token = headers
        .get("x-hold-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::validation("missing X-Hold-Token header"))?;

    let released = state.holds.release(&slot_key, token).await;
    Ok(Json(ApiResponse::success(ReleaseResponse { released })))
}

/// Create a booking. Duplicate submissions carrying the same
/// `Idempotency-Key` header resolve to the same appointment.
async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<impl IntoResponse, Error> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let confirmation = state.booking.book(&request, idempotency_key).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(confirmation)),
    ))
}
