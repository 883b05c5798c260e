//! API server assembly
//!
//! Wires the availability and booking services, the hold manager and the
//! configuration into an axum server with optional CORS and request
//! tracing, plus graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::availability::AvailabilityService;
use crate::booking::BookingService;
use crate::config::Config;
use crate::hold::HoldManager;

use super::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Availability read path
    pub availability: Arc<AvailabilityService>,

    /// Booking claim protocol
    pub booking: Arc<BookingService>,

    /// Advisory hold manager
    pub holds: Arc<HoldManager>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        availability: Arc<AvailabilityService>,
        booking: Arc<BookingService>,
        holds: Arc<HoldManager>,
    ) -> Self {
        Self {
            availability,
            booking,
            holds,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server startup and serving errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("failed to bind {addr}: {reason}")]
    BindError { addr: SocketAddr, reason: String },

    #[error("serve error: {0}")]
    ServeError(String),
}

// ============================================================================
// API Server
// ============================================================================

/// Main API server
pub struct ApiServer {
    config: Config,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: Config, state: AppState) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    fn bind_address(&self) -> Result<SocketAddr, ServerError> {
        self.config
            .server
            .bind_address
            .parse()
            .map_err(|e| ServerError::ConfigError(format!("invalid bind address: {e}")))
    }

    /// Start the server and serve until the process ends
    pub async fn start(&self) -> Result<(), ServerError> {
        self.serve(std::future::pending()).await
    }

    /// Start with graceful shutdown on the given signal
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        self.serve(shutdown_signal).await
    }

    async fn serve(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.bind_address()?;

        tracing::info!(addr = %addr, "Starting booking API server");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError {
                addr,
                reason: e.to_string(),
            })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Server stopped");
        Ok(())
    }
}
