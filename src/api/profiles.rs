//! Aggregator profile registration.
//!
//! A creator using the aggregator path registers their aggregator profile
//! key once; the connect flow looks it up before building the hosted
//! connect-page URL. The key itself is sealed at rest and never returned.

use super::error::ApiError;
use crate::auth::extract_creator;
use crate::connection::ConnectionStore;
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state for the profiles API
#[derive(Clone)]
pub struct ProfilesAppState {
    pub store: Arc<ConnectionStore>,
}

/// Request body for POST /profiles
#[derive(Deserialize)]
pub struct RegisterProfileRequest {
    pub profile_key: String,
}

/// Response for POST /profiles
#[derive(Serialize)]
pub struct RegisterProfileResponse {
    pub success: bool,
}

/// Response for GET /profiles
#[derive(Serialize)]
pub struct ProfileStatusResponse {
    pub registered: bool,
}

/// Create profiles API router
pub fn create_profiles_router(state: ProfilesAppState) -> Router {
    Router::new()
        .route("/profiles", post(register_profile))
        .route("/profiles", get(profile_status))
        .with_state(Arc::new(state))
}

/// POST /profiles - Register or replace the caller's aggregator profile key
async fn register_profile(
    State(state): State<Arc<ProfilesAppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterProfileRequest>,
) -> Result<Json<RegisterProfileResponse>, ApiError> {
    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    if body.profile_key.trim().is_empty() {
        return Err(ApiError::Validation("profile_key must not be empty".to_string()));
    }

    state
        .store
        .set_profile(&creator_id, body.profile_key.trim())
        .map_err(|e| {
            warn!(creator = %creator_id, error = %e, "Failed to store profile key");
            ApiError::Internal("Failed to store profile key".to_string())
        })?;

    info!(creator = %creator_id, "Aggregator profile registered");

    Ok(Json(RegisterProfileResponse { success: true }))
}

/// GET /profiles - Whether the caller has a registered profile key
async fn profile_status(
    State(state): State<Arc<ProfilesAppState>>,
    headers: HeaderMap,
) -> Result<Json<ProfileStatusResponse>, ApiError> {
    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    debug!(creator = %creator_id, "Checking aggregator profile");

    let registered = state
        .store
        .get_profile(&creator_id)
        .map_err(|e| {
            warn!(creator = %creator_id, error = %e, "Failed to read profile key");
            ApiError::Internal("Failed to read profile key".to_string())
        })?
        .is_some();

    Ok(Json(ProfileStatusResponse { registered }))
}
