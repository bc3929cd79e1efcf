//! Token refresh API endpoint.
//!
//! Server-to-server surface: the publisher (or an external workflow
//! engine) calls this before publishing with an expired access token.
//! Exactly one provider attempt per call; the caller decides whether to
//! retry later.

use super::error::ApiError;
use super::oauth::ProviderRegistry;
use crate::auth::verify_service_secret;
use crate::connection::{ConnectionStore, Platform};
use crate::refresh::{refresh_connection, RefreshError, RefreshGate, RefreshOutcome};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Shared application state for the refresh API
#[derive(Clone)]
pub struct RefreshAppState {
    pub store: Arc<ConnectionStore>,
    pub registry: Arc<ProviderRegistry>,
    pub gate: Arc<RefreshGate>,
    pub service_secret: Option<String>,
}

/// Request body for POST /refresh-token
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub creator_id: String,
    pub platform: String,
}

/// Response for POST /refresh-token
#[derive(Serialize)]
pub struct RefreshTokenResponse {
    pub success: bool,
    pub requires_reconnection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create refresh API router
pub fn create_refresh_router(state: RefreshAppState) -> Router {
    Router::new()
        .route("/refresh-token", post(refresh_token))
        .with_state(Arc::new(state))
}

/// POST /refresh-token - Run one refresh attempt for a connection
async fn refresh_token(
    State(state): State<Arc<RefreshAppState>>,
    headers: HeaderMap,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let secret = state.service_secret.as_deref().ok_or_else(|| {
        error!("Service secret not configured, refresh endpoint unavailable");
        ApiError::Configuration(
            "Service secret not configured. Set CROSSPOST_SERVICE_SECRET.".to_string(),
        )
    })?;

    verify_service_secret(&headers, secret)
        .map_err(|e| ApiError::Authentication(format!("Caller rejected: {}", e)))?;

    let platform = Platform::parse(&body.platform)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", body.platform)))?;

    debug!(creator = %body.creator_id, platform = %platform, "Refresh requested");

    let outcome = refresh_connection(
        &state.store,
        &state.registry,
        &state.gate,
        &body.creator_id,
        platform,
    )
    .await
    .map_err(|e| match e {
        RefreshError::NotFound => {
            ApiError::NotFound(format!("No connection for platform '{}'", platform))
        }
        RefreshError::NotConfigured(platform) => ApiError::Configuration(format!(
            "No OAuth provider configured for platform '{}'",
            platform
        )),
        RefreshError::Internal(e) => {
            error!(creator = %body.creator_id, platform = %platform, error = %e, "Refresh failed");
            ApiError::Internal("Refresh failed".to_string())
        }
    })?;

    let response = match outcome {
        RefreshOutcome::Refreshed { expires_at } => RefreshTokenResponse {
            success: true,
            requires_reconnection: false,
            expires_at: Some(expires_at),
        },
        RefreshOutcome::ReconnectRequired => RefreshTokenResponse {
            success: false,
            requires_reconnection: true,
            expires_at: None,
        },
        RefreshOutcome::InFlight => RefreshTokenResponse {
            success: false,
            requires_reconnection: false,
            expires_at: None,
        },
    };

    Ok(Json(response))
}
