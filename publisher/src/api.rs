//! Publish HTTP API.
//!
//! One route: `POST /publish`. The handler loads the stored connection,
//! rejects unusable credentials before any platform call (flagged
//! connections, expired access tokens), dispatches through the registry,
//! and maps every flow into one normalized response or error body.

use crate::registry::PublisherRegistry;
use crate::types::{PublishError, PublishOptions, PublishRequest, PublishStatus};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use crosspost::auth::verify_service_secret;
use crosspost::connection::{ConnectionStatus, ConnectionStore, Platform};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared state for the publish API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ConnectionStore>,
    pub registry: Arc<PublisherRegistry>,
    pub service_secret: Option<String>,
}

/// Request body for `POST /publish`.
#[derive(Deserialize)]
pub struct PublishApiRequest {
    pub creator_id: String,
    pub platform: String,
    pub content: PublishContent,
}

/// Content portion of a publish request.
#[derive(Deserialize)]
pub struct PublishContent {
    pub media_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub options: PublishOptions,
}

/// Response for `POST /publish`.
#[derive(Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub platform_post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    pub status: PublishStatus,
}

/// Create the publish API router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/publish", post(publish))
        .with_state(Arc::new(state))
}

/// POST /publish - Run one publish flow for a stored connection.
async fn publish(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<PublishApiRequest>,
) -> Result<Json<PublishResponse>, AppError> {
    let secret = state.service_secret.as_deref().ok_or_else(|| {
        error!("Service secret not configured, publish endpoint unavailable");
        AppError::ServerError(
            "Service secret not configured. Set CROSSPOST_SERVICE_SECRET.".to_string(),
        )
    })?;

    verify_service_secret(&headers, secret)
        .map_err(|e| AppError::Unauthorized(format!("Caller rejected: {}", e)))?;

    let platform = Platform::parse(&body.platform)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported platform '{}'", body.platform)))?;

    let request_id = Uuid::new_v4();
    debug!(
        request_id = %request_id,
        creator = %body.creator_id,
        platform = %platform,
        "Publish requested"
    );

    let versioned = state
        .store
        .get(&body.creator_id, platform)
        .map_err(|e| {
            error!(creator = %body.creator_id, platform = %platform, error = %e, "Failed to read connection");
            AppError::ServerError("Failed to read connection".to_string())
        })?
        .ok_or_else(|| {
            AppError::NotFound(format!("No connection for platform '{}'", platform))
        })?;

    let connection = versioned.connection;

    // Credential checks happen before any platform call so failure
    // attribution stays with the caller
    match connection.effective_status(Utc::now()) {
        ConnectionStatus::RequiresReconnect => {
            warn!(
                request_id = %request_id,
                creator = %body.creator_id,
                platform = %platform,
                "Publish rejected: connection requires re-authorization"
            );
            return Err(AppError::ReconnectRequired(format!(
                "Connection for '{}' requires re-authorization",
                platform
            )));
        }
        ConnectionStatus::AccessExpired => {
            warn!(
                request_id = %request_id,
                creator = %body.creator_id,
                platform = %platform,
                "Publish rejected: access token expired"
            );
            return Err(AppError::AccessExpired(format!(
                "Access token for '{}' has expired; refresh it before publishing",
                platform
            )));
        }
        ConnectionStatus::Connected => {}
    }

    let publisher = state
        .registry
        .select(platform, connection.origin)
        .ok_or_else(|| {
            error!(platform = %platform, origin = ?connection.origin, "No publisher available");
            AppError::ServerError(format!("No publisher configured for '{}'", platform))
        })?;

    let request = PublishRequest {
        platform,
        media_url: body.content.media_url,
        title: body.content.title,
        caption: body.content.caption,
        options: body.content.options,
    };

    let outcome = publisher
        .publish(&connection.access_token, &request)
        .await
        .map_err(|e| {
            warn!(
                request_id = %request_id,
                creator = %body.creator_id,
                platform = %platform,
                error = %e,
                "Publish flow failed"
            );
            AppError::from_publish_error(e)
        })?;

    info!(
        request_id = %request_id,
        creator = %body.creator_id,
        platform = %platform,
        post_id = %outcome.platform_post_id,
        status = ?outcome.status,
        "Publish completed"
    );

    Ok(Json(PublishResponse {
        success: true,
        platform_post_id: outcome.platform_post_id,
        permalink: outcome.permalink,
        status: outcome.status,
    }))
}

/// Application error types for the publish API
enum AppError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    ReconnectRequired(String),
    AccessExpired(String),
    Provider {
        code: &'static str,
        message: String,
        container_id: Option<String>,
    },
    ServerError(String),
}

impl AppError {
    fn from_publish_error(error: PublishError) -> Self {
        match error {
            PublishError::ProviderRejected(message) => AppError::Provider {
                code: "provider_rejected",
                message,
                container_id: None,
            },
            PublishError::Timeout { attempts } => AppError::Provider {
                code: "timeout",
                message: format!(
                    "No terminal state after {} status polls; retry the publish",
                    attempts
                ),
                container_id: None,
            },
            PublishError::PartialFailure {
                container_id,
                message,
            } => AppError::Provider {
                code: "partial_failure",
                message,
                container_id: Some(container_id),
            },
            PublishError::Upstream(message) => AppError::Provider {
                code: "provider_error",
                message,
                container_id: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, container_id) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            AppError::ReconnectRequired(msg) => {
                (StatusCode::CONFLICT, "reconnect_required", msg, None)
            }
            AppError::AccessExpired(msg) => (StatusCode::CONFLICT, "access_expired", msg, None),
            AppError::Provider {
                code,
                message,
                container_id,
            } => (StatusCode::BAD_GATEWAY, code, message, container_id),
            AppError::ServerError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(container_id) = container_id {
            body["container_id"] = json!(container_id);
        }

        (status, Json(body)).into_response()
    }
}
