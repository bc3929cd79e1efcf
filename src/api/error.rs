//! HTTP error taxonomy.
//!
//! Every component failure is mapped to one of these variants at the API
//! boundary. Provider rejections carry the upstream message for
//! diagnostics, but a raw provider payload never propagates to callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// API-level errors shared by all routers.
#[derive(Debug)]
pub enum ApiError {
    /// Required provider credentials or service settings are absent (500).
    Configuration(String),
    /// Missing or invalid caller identity (401).
    Authentication(String),
    /// Missing or malformed request parameters (400).
    Validation(String),
    /// Upstream provider rejected the call (502). Not retried here.
    Provider(String),
    /// Unknown creator, connection, or resource (404).
    NotFound(String),
    /// Refresh is exhausted; the creator must re-authorize (409).
    ReconnectRequired(String),
    /// Unexpected store or infrastructure failure (500).
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "not_configured"),
            ApiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::ReconnectRequired(_) => (StatusCode::CONFLICT, "reconnect_required"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::Configuration(msg)
            | ApiError::Authentication(msg)
            | ApiError::Validation(msg)
            | ApiError::Provider(msg)
            | ApiError::NotFound(msg)
            | ApiError::ReconnectRequired(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": self.message(),
            "code": code,
        }));

        (status, body).into_response()
    }
}
