//! Connection status API endpoints.
//!
//! Lists, inspects, and removes a creator's platform connections. Status
//! is computed from the stored row: a connected row past its expiry
//! reports `access_expired`; platforms without a row report
//! `not_connected`. Tokens never leave the store through these routes.

use super::error::ApiError;
use crate::auth::extract_creator;
use crate::connection::{ConnectionStatus, ConnectionStore, Platform};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state for the connections API
#[derive(Clone)]
pub struct ConnectionsAppState {
    pub store: Arc<ConnectionStore>,
}

/// Connection status summary (for the list endpoint)
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConnectionSummary {
    pub platform: Platform,
    pub connected: bool,
    pub status: String,
}

/// Detailed connection status (for the single-platform endpoint)
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConnectionDetail {
    pub platform: Platform,
    pub status: String,
    pub origin: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub has_refresh_token: bool,
}

/// List connections response
#[derive(Serialize)]
pub struct ListConnectionsResponse {
    pub connections: Vec<ConnectionSummary>,
}

/// Response for DELETE /connections/:platform
#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// Create connections API router
pub fn create_connections_router(state: ConnectionsAppState) -> Router {
    Router::new()
        .route("/connections", get(list_connections))
        .route("/connections/:platform", get(get_connection))
        .route("/connections/:platform", delete(disconnect))
        .with_state(Arc::new(state))
}

/// GET /connections - Status for every supported platform
async fn list_connections(
    State(state): State<Arc<ConnectionsAppState>>,
    headers: HeaderMap,
) -> Result<Json<ListConnectionsResponse>, ApiError> {
    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    debug!(creator = %creator_id, "Listing connections");

    let stored = state.store.list_by_creator(&creator_id).map_err(|e| {
        warn!(creator = %creator_id, error = %e, "Failed to list connections");
        ApiError::Internal("Failed to list connections".to_string())
    })?;

    let now = Utc::now();
    let connections = Platform::ALL
        .iter()
        .map(|&platform| {
            match stored.iter().find(|c| c.platform == platform) {
                Some(connection) => {
                    let status = connection.effective_status(now);
                    ConnectionSummary {
                        platform,
                        connected: status == ConnectionStatus::Connected,
                        status: status.as_str().to_string(),
                    }
                }
                None => ConnectionSummary {
                    platform,
                    connected: false,
                    status: "not_connected".to_string(),
                },
            }
        })
        .collect();

    Ok(Json(ListConnectionsResponse { connections }))
}

/// GET /connections/:platform - Detailed status for one platform
async fn get_connection(
    State(state): State<Arc<ConnectionsAppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
) -> Result<Json<ConnectionDetail>, ApiError> {
    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    let platform = Platform::parse(&platform)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", platform)))?;

    debug!(creator = %creator_id, platform = %platform, "Getting connection status");

    let versioned = state
        .store
        .get(&creator_id, platform)
        .map_err(|e| {
            warn!(creator = %creator_id, platform = %platform, error = %e, "Failed to read connection");
            ApiError::Internal("Failed to read connection".to_string())
        })?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No connection for platform '{}'", platform))
        })?;

    let connection = versioned.connection;

    Ok(Json(ConnectionDetail {
        platform,
        status: connection.effective_status(Utc::now()).as_str().to_string(),
        origin: connection.origin.as_str().to_string(),
        expires_at: connection.expires_at,
        scopes: connection.scopes,
        has_refresh_token: connection.refresh_token.is_some(),
    }))
}

/// DELETE /connections/:platform - Remove a stored connection
async fn disconnect(
    State(state): State<Arc<ConnectionsAppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    let platform = Platform::parse(&platform)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", platform)))?;

    debug!(creator = %creator_id, platform = %platform, "Disconnecting platform");

    let deleted = state.store.delete(&creator_id, platform).map_err(|e| {
        warn!(creator = %creator_id, platform = %platform, error = %e, "Failed to delete connection");
        ApiError::Internal("Failed to delete connection".to_string())
    })?;

    if !deleted {
        return Err(ApiError::NotFound(format!(
            "No connection for platform '{}'",
            platform
        )));
    }

    info!(creator = %creator_id, platform = %platform, "Connection removed");

    Ok(Json(DisconnectResponse { success: true }))
}
