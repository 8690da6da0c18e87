//! Process-bootstrap errors (bad config, an unreachable store at startup)
//! with the single `IntoResponse` boundary translation spec.md §7 calls
//! for. Request-path errors (`AuthError`, `TransportError`) are mapped to
//! responses inside their own crates' handlers; this covers what can fail
//! before a router even exists.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shared store unavailable at startup: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "gateway error");
        let status = match self {
            GatewayError::InvalidConfig(_) | GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({"error": "internal_error"}))).into_response()
    }
}
