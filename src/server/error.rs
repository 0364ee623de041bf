//! Error types for web handlers.
//!
//! This module defines the application error type that bridges between
//! domain errors and HTTP responses, implementing Axum's `IntoResponse`
//! trait. User errors answer 400, the capacity rejections answer 409,
//! degraded service answers 503 and everything else collapses to a generic
//! 500 with the internal detail kept in the source slot for logging.

use crate::error::SaleError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Wraps domain errors and provides HTTP-friendly error responses.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<Data>, AppError> {
///     let grant = services.checkout.checkout(&user_id, &item_id).await?;
///     Ok(Json(grant))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// The user's current purchase count, on `USER_LIMIT_EXCEEDED`.
    user_purchases: Option<i64>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            user_purchases: None,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// HTTP status for a domain error.
#[must_use]
pub fn status_for(error: &SaleError) -> StatusCode {
    match error {
        SaleError::InvalidInput(_)
        | SaleError::NoActiveSale
        | SaleError::SaleNotActive
        | SaleError::InvalidCode
        | SaleError::CodeExpired
        | SaleError::CodeAlreadyUsed => StatusCode::BAD_REQUEST,
        SaleError::SoldOut | SaleError::UserLimitExceeded { .. } => StatusCode::CONFLICT,
        SaleError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        SaleError::CodeCollision
        | SaleError::CounterStore(_)
        | SaleError::RecordStore(_)
        | SaleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SaleError> for AppError {
    fn from(err: SaleError) -> Self {
        let status = status_for(&err);
        let code = err.kind().to_string();

        let user_purchases = match &err {
            SaleError::UserLimitExceeded { user_count } => Some(*user_count),
            _ => None,
        };

        if err.is_user_error() || err == SaleError::Unavailable {
            let mut app = Self::new(status, err.to_string(), code);
            app.user_purchases = user_purchases;
            app
        } else {
            // No internal detail crosses the wire; it rides in the source
            // slot for logging.
            Self::new(
                status,
                "Unable to process request at this time".to_string(),
                code,
            )
            .with_source(anyhow::Error::new(err))
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Always `false` on this envelope.
    success: bool,
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// The user's current purchase count, on `USER_LIMIT_EXCEEDED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    user_purchases: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            success: false,
            code: self.code,
            message: self.message,
            user_purchases: self.user_purchases,
        };

        (self.status, Json(body)).into_response()
    }
}
