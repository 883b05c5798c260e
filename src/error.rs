//! Unified error handling for the tempora crate
//!
//! A single [`Error`] enum covers the whole taxonomy the engine surfaces:
//! validation, not-found, conflict, upstream degradation, transaction
//! failures, plus the ambient store and I/O failure modes. Each error maps
//! to an [`ErrorCategory`] for handling strategy and to an HTTP status for
//! the API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub use crate::schedule::error::ScheduleError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or inconsistent request input
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Slot already held or claimed; retry with a different slot
    Conflict,
    /// A collaborator source failed; affected staff degrade to unavailable
    Upstream,
    /// Claim/appointment transaction failed and was rolled back
    Transaction,
    /// Database or shared-store errors
    Storage,
    /// Configuration and startup errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the tempora crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed window, unknown/excess services, bad slot key, staff mismatch
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing location/staff/service
    #[error("not found: {0}")]
    NotFound(String),

    /// Slot already held or claimed
    #[error("conflict: {0}")]
    Conflict(String),

    /// Schedule or shift-plan source failure
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Claim/appointment commit failure, rolled back entirely
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Schedule resolution errors
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// PostgreSQL errors
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// PostgreSQL pool errors
    #[error("database pool error: {0}")]
    DatabasePool(#[from] deadpool_postgres::PoolError),

    /// Redis errors
    #[error("shared store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Redis pool errors
    #[error("shared store pool error: {0}")]
    StorePool(#[from] deadpool_redis::PoolError),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::Schedule(e) => match e {
                ScheduleError::InvalidWindow { .. } | ScheduleError::InvalidDayWindow { .. } => {
                    ErrorCategory::Validation
                }
                ScheduleError::LocationNotFound { .. } => ErrorCategory::NotFound,
                _ => ErrorCategory::Upstream,
            },
            Self::Transaction(_) => ErrorCategory::Transaction,
            Self::Database(_) | Self::DatabasePool(_) | Self::Store(_) | Self::StorePool(_) => {
                ErrorCategory::Storage
            }
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Check if this error is recoverable by the caller (retry or pick a
    /// different slot)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Conflict | ErrorCategory::Upstream | ErrorCategory::Storage
        )
    }

    /// HTTP status code for the API surface
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCategory::Transaction
            | ErrorCategory::Storage
            | ErrorCategory::Config
            | ErrorCategory::Other => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "validation_error",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Upstream => "upstream_unavailable",
            ErrorCategory::Transaction => "transaction_error",
            ErrorCategory::Storage => "storage_error",
            ErrorCategory::Config => "config_error",
            ErrorCategory::Other => "internal_error",
        }
    }
}

/// Error body returned by the API
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
    pub retryable: bool,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            code: self.code(),
            error: self.to_string(),
            retryable: self.is_recoverable(),
        };
        if status.is_server_error() {
            tracing::error!(code = body.code, error = %body.error, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
