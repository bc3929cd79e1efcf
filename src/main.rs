use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use crosspost::api::{
    create_connections_router, create_oauth_router, create_profiles_router, create_refresh_router,
    run_state_cleanup, ConnectionsAppState, OAuthAppState, ProfilesAppState, RefreshAppState,
    StateManager,
};
use crosspost::api::oauth::ProviderRegistry;
use crosspost::config::{load_config, CrosspostConfig};
use crosspost::connection::ConnectionStore;
use crosspost::refresh::RefreshGate;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosspost=info".into()),
        )
        .init();

    info!("Crosspost starting...");

    // Load configuration (optional file, defaults otherwise)
    let config = match std::env::var("CROSSPOST_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            load_config(&path)?
        }
        Err(_) => CrosspostConfig::default(),
    };

    // Secrets come from the environment
    let encryption_key = std::env::var("CROSSPOST_ENCRYPTION_KEY")
        .context("CROSSPOST_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let service_secret = std::env::var("CROSSPOST_SERVICE_SECRET").ok();
    if service_secret.is_none() {
        warn!("CROSSPOST_SERVICE_SECRET not set - server-to-server endpoints disabled");
    }

    info!(
        bind_addr = %config.server.bind_addr,
        public_base_url = %config.server.public_base_url,
        db_path = %config.store.db_path,
        "Configuration loaded"
    );

    // Initialize connection store (shared by every router)
    let store = Arc::new(
        ConnectionStore::new(&config.store.db_path, &encryption_key)
            .context("Failed to initialize connection store")?,
    );
    info!("Connection store initialized");

    // Provider dispatch table from environment credentials
    let registry = Arc::new(ProviderRegistry::from_env());

    // OAuth state manager with periodic cleanup
    let state_manager = StateManager::new(config.oauth.state_ttl_seconds);
    tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.oauth.state_cleanup_interval_seconds,
    ));

    let oauth_state = OAuthAppState {
        store: Arc::clone(&store),
        registry: Arc::clone(&registry),
        state_manager,
        public_base_url: config.server.public_base_url.clone(),
        ui_status_url: config.oauth.ui_status_url.clone(),
        service_secret: service_secret.clone(),
    };

    let connections_state = ConnectionsAppState {
        store: Arc::clone(&store),
    };

    let profiles_state = ProfilesAppState {
        store: Arc::clone(&store),
    };

    let refresh_state = RefreshAppState {
        store: Arc::clone(&store),
        registry: Arc::clone(&registry),
        gate: Arc::new(RefreshGate::new()),
        service_secret,
    };

    let router = Router::new()
        .route("/health", get(health))
        .merge(create_oauth_router(oauth_state))
        .merge(create_connections_router(connections_state))
        .merge(create_profiles_router(profiles_state))
        .merge(create_refresh_router(refresh_state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .context("Failed to bind API address")?;
    info!(addr = %config.server.bind_addr, "Crosspost API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Crosspost stopped");

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
