//! Mapping from [`GateError`] to HTTP responses.
//!
//! Bodies are fixed strings. Rejection reasons and internal details are
//! logged, never returned.

use crate::GateError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

impl GateError {
    /// Status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::Forbidden(_) => StatusCode::FORBIDDEN,
            GateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            GateError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GateError::ConfigError(_)
            | GateError::StoreIO(_)
            | GateError::ProtocolError(_)
            | GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            GateError::RateLimited { retry_after_secs } => {
                return (
                    status,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    "Too many requests",
                )
                    .into_response();
            }
            GateError::UpstreamUnavailable(_) => {
                tracing::warn!(error = %self, "upstream failure");
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
            }
            _ => {}
        }

        let body = match status {
            StatusCode::NOT_FOUND => "Not found",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::BAD_REQUEST => "Invalid payload",
            StatusCode::SERVICE_UNAVAILABLE => "Upstream unavailable",
            _ => "Internal error",
        };
        (status, body).into_response()
    }
}
