//! Error types for docket-sync
//!
//! Every failure carries an [`ErrorClass`]; retry, circuit breaker and
//! dead-letter logic dispatch on the class, never on the concrete error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification tag for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network, timeout, rate limit, complexity budget: retry
    Transient,
    /// Client-error class responses: fail immediately
    Permanent,
    /// Business-critical field failed a sanity check: fail immediately
    Validation,
    /// Target item archived or deleted upstream: needs recreation
    ItemGone,
    /// Anything else: fail, keep going with the next case
    Unclassified,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Validation => "validation",
            ErrorClass::ItemGone => "item_gone",
            ErrorClass::Unclassified => "unclassified",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by the task board client
#[derive(Debug, Clone, Error)]
pub enum BoardError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Complexity budget exhausted")]
    ComplexityBudgetExhausted { retry_after: Option<Duration> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Item {0} is inactive or archived")]
    ItemInactive(String),

    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Board error: {0}")]
    Other(String),
}

impl BoardError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BoardError::Network(_)
            | BoardError::Timeout(_)
            | BoardError::RateLimited { .. }
            | BoardError::ComplexityBudgetExhausted { .. } => ErrorClass::Transient,
            BoardError::Validation(_) => ErrorClass::Validation,
            BoardError::ItemInactive(_) => ErrorClass::ItemGone,
            BoardError::Http { status, .. } => match *status {
                408 | 429 => ErrorClass::Transient,
                400..=499 => ErrorClass::Permanent,
                500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Unclassified,
            },
            BoardError::Other(_) => ErrorClass::Unclassified,
        }
    }

    /// Explicit retry hint from the upstream, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BoardError::RateLimited { retry_after }
            | BoardError::ComplexityBudgetExhausted { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            BoardError::Network(_) => "BoardError::Network",
            BoardError::Timeout(_) => "BoardError::Timeout",
            BoardError::RateLimited { .. } => "BoardError::RateLimited",
            BoardError::ComplexityBudgetExhausted { .. } => "BoardError::ComplexityBudgetExhausted",
            BoardError::Validation(_) => "BoardError::Validation",
            BoardError::ItemInactive(_) => "BoardError::ItemInactive",
            BoardError::Http { .. } => "BoardError::Http",
            BoardError::Other(_) => "BoardError::Other",
        }
    }
}

/// Errors reported by the source-of-record reader
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Connection or availability problem
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Query rejected or returned unusable data
    #[error("Source query failed: {0}")]
    Query(String),
}

impl SourceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SourceError::Unavailable(_) => ErrorClass::Transient,
            SourceError::Query(_) => ErrorClass::Permanent,
        }
    }
}

/// Per-case and run-level engine error
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("State store error: {0}")]
    Store(#[from] docket_common::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Cancelled")]
    Cancelled,

    #[error("Run lock lost to another holder")]
    LockLost,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Board(e) => e.class(),
            SyncError::Source(e) => e.class(),
            SyncError::Store(_) | SyncError::LockLost => ErrorClass::Unclassified,
            SyncError::Validation(_) => ErrorClass::Validation,
            SyncError::CircuitOpen | SyncError::Cancelled => ErrorClass::Transient,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Board(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Stable type name used for alert fingerprints
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Board(e) => e.kind(),
            SyncError::Source(SourceError::Unavailable(_)) => "SourceError::Unavailable",
            SyncError::Source(SourceError::Query(_)) => "SourceError::Query",
            SyncError::Store(_) => "StoreError",
            SyncError::Validation(_) => "ValidationError",
            SyncError::CircuitOpen => "CircuitOpen",
            SyncError::Cancelled => "Cancelled",
            SyncError::LockLost => "LockLost",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(docket_common::Error::Database(err))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Operator API error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] docket_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
