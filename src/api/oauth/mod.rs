//! OAuth 2.0 authorization flow for platform connections.
//!
//! Implements the authorization code flow:
//! 1. Creator clicks "Connect" in the dashboard
//! 2. GET /connect/:platform → Redirect to provider
//! 3. Creator authorizes on the provider's site
//! 4. Provider redirects to /connect/:platform/callback
//! 5. Exchange code for tokens, upsert the connection record
//! 6. Platform is now "connected" and can receive publishes
//!
//! Aggregator-mediated connections replace steps 2-5 with the
//! aggregator's hosted page plus a server-to-server webhook.

mod exchange;
mod provider;
mod state_manager;

pub use exchange::{ClientCredentials, TokenGrant};
pub use provider::{
    AggregatorProvider, InstagramProvider, OAuthProvider, ProviderRegistry, TikTokProvider,
    YouTubeProvider,
};
pub use state_manager::{run_state_cleanup, StateManager};

use super::error::ApiError;
use crate::auth::{extract_creator, verify_service_secret};
use crate::connection::{
    Connection, ConnectionOrigin, ConnectionStatus, ConnectionStore, Platform,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Nominal lifetime of an aggregator profile key. Aggregator credentials
/// do not expire on their own; the far-future instant keeps the
/// "expires_at is always set" invariant.
const AGGREGATOR_TOKEN_TTL_DAYS: i64 = 3650;

/// Shared application state for OAuth API
#[derive(Clone)]
pub struct OAuthAppState {
    pub store: Arc<ConnectionStore>,
    pub registry: Arc<ProviderRegistry>,
    pub state_manager: StateManager,
    /// Public base URL used to build redirect URIs
    pub public_base_url: String,
    /// UI page callbacks redirect to, with `?success=` appended
    pub ui_status_url: String,
    /// Shared secret for webhook-style callers, when configured
    pub service_secret: Option<String>,
}

/// Query parameters for GET /connect/:platform
#[derive(Deserialize)]
pub struct ConnectParams {
    /// Comma-separated platform list, aggregator mode only
    platforms: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Payload for the aggregator linking webhook
#[derive(Deserialize)]
pub struct AggregatorCallbackPayload {
    pub creator_id: String,
    pub profile_key: String,
    pub platforms: Vec<String>,
}

/// Response for the aggregator linking webhook
#[derive(Serialize)]
pub struct AggregatorCallbackResponse {
    pub success: bool,
    pub connected: Vec<Platform>,
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    // The static aggregator callback path shadows the :platform capture,
    // so its browser-return leg needs its own GET handler.
    Router::new()
        .route(
            "/connect/aggregator/callback",
            get(aggregator_return).post(aggregator_callback),
        )
        .route("/connect/:platform", get(connect_start))
        .route("/connect/:platform/callback", get(connect_callback))
        .with_state(Arc::new(state))
}

/// GET /connect/:platform
///
/// Initiates a connect flow by redirecting the creator to the provider's
/// authorization page (or the aggregator's hosted connect page).
///
/// # Security
/// - Requires a creator bearer session
/// - Issues a single-use state value with a 10-minute default expiry,
///   binding the flow to the creator
async fn connect_start(
    State(state): State<Arc<OAuthAppState>>,
    Path(target): Path<String>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    debug!(target = %target, "Connect flow requested");

    let creator_id = extract_creator(&headers)
        .map_err(|e| ApiError::Authentication(format!("Invalid session: {}", e)))?;

    debug!(target = %target, creator = %creator_id, "Creator authenticated");

    if target == "aggregator" {
        return start_aggregator_connect(&state, &creator_id, params.platforms.as_deref()).await;
    }

    let platform = Platform::parse(&target)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", target)))?;

    let provider = state.registry.get(platform).ok_or_else(|| {
        error!(platform = %platform, "OAuth provider not configured (missing env vars?)");
        let prefix = platform.as_str().to_uppercase();
        ApiError::Configuration(format!(
            "OAuth not configured for platform '{}'. Set CROSSPOST_OAUTH_{}_CLIENT_ID and CROSSPOST_OAUTH_{}_CLIENT_SECRET environment variables.",
            platform, prefix, prefix
        ))
    })?;

    let csrf_state = state.state_manager.issue(&target, &creator_id);
    let redirect_uri = callback_uri(&state.public_base_url, &target);
    let auth_url = provider.build_auth_url(&csrf_state, &redirect_uri);

    info!(
        platform = %platform,
        creator = %creator_id,
        "Redirecting to OAuth provider"
    );

    Ok(Redirect::temporary(&auth_url))
}

/// Aggregator branch of the connect flow: the creator must have a
/// registered profile key, and the redirect goes to the aggregator's
/// hosted connect page for the requested platforms.
async fn start_aggregator_connect(
    state: &OAuthAppState,
    creator_id: &str,
    platforms_param: Option<&str>,
) -> Result<Redirect, ApiError> {
    let aggregator = state.registry.aggregator().ok_or_else(|| {
        error!("Aggregator not configured");
        ApiError::Configuration(
            "Aggregator not configured. Set CROSSPOST_AGGREGATOR_API_KEY and CROSSPOST_AGGREGATOR_CONNECT_URL environment variables.".to_string(),
        )
    })?;

    let profile_key = state
        .store
        .get_profile(creator_id)
        .map_err(|e| {
            error!(creator = %creator_id, error = %e, "Failed to read aggregator profile");
            ApiError::Internal("Failed to read aggregator profile".to_string())
        })?
        .ok_or_else(|| {
            warn!(creator = %creator_id, "No aggregator profile registered");
            ApiError::NotFound(
                "No aggregator profile registered for this creator".to_string(),
            )
        })?;

    let platforms = parse_platform_list(platforms_param)?;

    let csrf_state = state.state_manager.issue("aggregator", creator_id);
    let redirect_uri = callback_uri(&state.public_base_url, "aggregator");
    let connect_url =
        aggregator.build_connect_url(&profile_key, &platforms, &redirect_uri, &csrf_state);

    info!(
        creator = %creator_id,
        platforms = ?platforms,
        "Redirecting to aggregator connect page"
    );

    Ok(Redirect::temporary(&connect_url))
}

/// GET /connect/:platform/callback
///
/// Exchanges the authorization code for tokens and upserts the connection
/// record, then sends the browser back to the UI status page. Replaying a
/// code can only re-write the same (creator, platform) row; the store
/// key makes the handler idempotent.
///
/// # Security
/// - Validates the single-use state value (nonce known, unexpired,
///   embedded creator matches)
/// - Verifies the connect target matches the one the state was issued for
async fn connect_callback(
    State(state): State<Arc<OAuthAppState>>,
    Path(target): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, ApiError> {
    debug!(target = %target, "OAuth callback received");

    // Provider-reported denial: bounce back to the UI as a failure
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            target = %target,
            error = %error,
            description = %description,
            "Authorization failed at the provider"
        );
        return Ok(status_redirect(&state.ui_status_url, &target, false).into_response());
    }

    let code = callback
        .code
        .ok_or_else(|| ApiError::Validation("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| ApiError::Validation("Missing 'state' parameter".to_string()))?;

    debug!(target = %target, "Validating state");

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!(target = %target, "Invalid, expired, or tampered OAuth state");
            ApiError::Authentication(
                "State does not correspond to an authenticated creator".to_string(),
            )
        })?;

    if entry.target != target {
        error!(
            expected = %entry.target,
            actual = %target,
            "Connect target mismatch"
        );
        return Err(ApiError::Validation("Connect target mismatch".to_string()));
    }

    let creator_id = entry.creator_id;

    let platform = Platform::parse(&target)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", target)))?;

    let provider = state.registry.get(platform).ok_or_else(|| {
        error!(platform = %platform, "OAuth provider not configured");
        ApiError::Configuration(format!("OAuth not configured for platform '{}'", platform))
    })?;

    // Must match the redirect URI used at the start of the flow
    let redirect_uri = callback_uri(&state.public_base_url, &target);

    debug!(platform = %platform, creator = %creator_id, "Exchanging authorization code");
    let grant = provider
        .exchange_code(&code, &redirect_uri)
        .await
        .map_err(|e| {
            error!(platform = %platform, creator = %creator_id, error = %e, "Code exchange failed");
            ApiError::Provider(format!("Authorization code exchange failed: {}", e))
        })?;

    let scopes = if grant.scopes.is_empty() {
        provider.scopes().to_vec()
    } else {
        grant.scopes.clone()
    };

    let has_refresh_token = grant.refresh_token.is_some();
    let connection = Connection {
        creator_id: creator_id.clone(),
        platform,
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        expires_at: grant.expires_at,
        scopes,
        status: ConnectionStatus::Connected,
        origin: ConnectionOrigin::Direct,
    };

    state.store.upsert(&connection).map_err(|e| {
        error!(platform = %platform, creator = %creator_id, error = %e, "Failed to store connection");
        ApiError::Internal("Failed to store connection".to_string())
    })?;

    info!(
        platform = %platform,
        creator = %creator_id,
        has_refresh_token,
        "Connection established"
    );

    Ok(status_redirect(&state.ui_status_url, &target, true).into_response())
}

/// GET /connect/aggregator/callback
///
/// Browser-return leg of the aggregator flow. Linking data arrives via
/// the webhook; this only validates the state and closes the loop for
/// the creator's browser.
async fn aggregator_return(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, ApiError> {
    if let Some(error) = callback.error {
        warn!(error = %error, "Aggregator connect page reported an error");
        return Ok(status_redirect(&state.ui_status_url, "aggregator", false).into_response());
    }

    let csrf_state = callback
        .state
        .ok_or_else(|| ApiError::Validation("Missing 'state' parameter".to_string()))?;

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!("Invalid, expired, or tampered OAuth state");
            ApiError::Authentication(
                "State does not correspond to an authenticated creator".to_string(),
            )
        })?;

    if entry.target != "aggregator" {
        return Err(ApiError::Validation("Connect target mismatch".to_string()));
    }

    info!(creator = %entry.creator_id, "Aggregator connect page returned");
    Ok(status_redirect(&state.ui_status_url, "aggregator", true).into_response())
}

/// POST /connect/aggregator/callback
///
/// Server-to-server webhook the aggregator calls once a creator finishes
/// linking platforms on the hosted page. Upserts one connection per
/// linked platform, each carrying the profile key as its credential.
async fn aggregator_callback(
    State(state): State<Arc<OAuthAppState>>,
    headers: HeaderMap,
    Json(payload): Json<AggregatorCallbackPayload>,
) -> Result<Json<AggregatorCallbackResponse>, ApiError> {
    let secret = state.service_secret.as_deref().ok_or_else(|| {
        error!("Service secret not configured, aggregator webhook unavailable");
        ApiError::Configuration(
            "Service secret not configured. Set CROSSPOST_SERVICE_SECRET.".to_string(),
        )
    })?;

    verify_service_secret(&headers, secret)
        .map_err(|e| ApiError::Authentication(format!("Webhook rejected: {}", e)))?;

    let registered = state
        .store
        .get_profile(&payload.creator_id)
        .map_err(|e| {
            error!(creator = %payload.creator_id, error = %e, "Failed to read aggregator profile");
            ApiError::Internal("Failed to read aggregator profile".to_string())
        })?
        .ok_or_else(|| {
            ApiError::NotFound("No aggregator profile registered for this creator".to_string())
        })?;

    if registered != payload.profile_key {
        warn!(creator = %payload.creator_id, "Webhook profile key does not match registration");
        return Err(ApiError::Authentication(
            "Profile key does not match the registered profile".to_string(),
        ));
    }

    let mut connected = Vec::with_capacity(payload.platforms.len());
    for name in &payload.platforms {
        let platform = Platform::parse(name)
            .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", name)))?;

        let connection = Connection {
            creator_id: payload.creator_id.clone(),
            platform,
            access_token: payload.profile_key.clone(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::days(AGGREGATOR_TOKEN_TTL_DAYS),
            scopes: Vec::new(),
            status: ConnectionStatus::Connected,
            origin: ConnectionOrigin::Aggregator,
        };

        state.store.upsert(&connection).map_err(|e| {
            error!(platform = %platform, creator = %payload.creator_id, error = %e, "Failed to store connection");
            ApiError::Internal("Failed to store connection".to_string())
        })?;

        connected.push(platform);
    }

    info!(
        creator = %payload.creator_id,
        platforms = ?connected,
        "Aggregator connections established"
    );

    Ok(Json(AggregatorCallbackResponse {
        success: true,
        connected,
    }))
}

fn callback_uri(public_base_url: &str, target: &str) -> String {
    format!("{}/connect/{}/callback", public_base_url, target)
}

fn status_redirect(ui_status_url: &str, target: &str, success: bool) -> Redirect {
    Redirect::temporary(&format!(
        "{}?success={}&platform={}",
        ui_status_url, success, target
    ))
}

fn parse_platform_list(raw: Option<&str>) -> Result<Vec<Platform>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Platform::ALL.to_vec());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Platform::parse(name)
                .ok_or_else(|| ApiError::Validation(format!("Unsupported platform '{}'", name)))
        })
        .collect()
}
