// error.rs — Gateway error taxonomy and its HTTP mapping.
//
// Every 4xx/5xx response body is {"detail": ...}. Credential and token
// failures are deliberately uniform: the concrete reason is logged at
// the gate, never returned to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use ag_store::StoreError;

/// Errors a handler can surface. Each maps to one status + detail body.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid static credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Token failed signature, expiry, or revocation — uniform surface.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Authenticated, but the wrong identity class for this endpoint.
    #[error("{0} token required")]
    WrongClass(&'static str),

    /// The referenced entity does not exist (or is hidden from the caller).
    #[error("not found")]
    NotFound,

    /// Request body failed validation; one message per offending field.
    #[error("validation failed")]
    Validation(Vec<String>),

    /// The caller exceeded its rate bucket.
    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },

    /// The approval has already been decided.
    #[error("approval already decided")]
    AlreadyDecided,

    /// The audit store could not record the decision; no decision is emitted.
    #[error("audit unavailable")]
    AuditUnavailable,

    /// A backing service is down and no safe default applies.
    #[error("service unavailable")]
    Unavailable,

    /// A bug surfaced. Logged with detail; the body stays generic.
    #[error("internal error")]
    Internal(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => GatewayError::NotFound,
            StoreError::AlreadyDecided => GatewayError::AlreadyDecided,
            StoreError::Unavailable(_) => GatewayError::Unavailable,
            StoreError::Conflict(detail) => GatewayError::Internal(format!("conflict: {}", detail)),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::WrongClass(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::AlreadyDecided => StatusCode::CONFLICT,
            GatewayError::AuditUnavailable | GatewayError::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }
        let status = self.status();
        let body = match &self {
            GatewayError::Validation(fields) => json!({ "detail": fields }),
            GatewayError::RateLimited { retry_after } => json!({
                "detail": "rate limit exceeded",
                "retry_after": retry_after,
            }),
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
