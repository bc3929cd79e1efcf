use anyhow::{Context, Result};
use crosspost::connection::ConnectionStore;
use publisher::api::{create_router, ApiState};
use publisher::{PollSettings, PublisherRegistry};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "publisher=info".into()),
        )
        .init();

    info!("Publisher starting...");

    // Read configuration from environment
    let encryption_key = std::env::var("CROSSPOST_ENCRYPTION_KEY")
        .context("CROSSPOST_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let connections_db = std::env::var("CROSSPOST_CONNECTIONS_DB")
        .unwrap_or_else(|_| "connections.db".to_string());

    let api_port: u16 = std::env::var("PUBLISHER_API_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse()
        .context("PUBLISHER_API_PORT must be a valid port number")?;

    let service_secret = std::env::var("CROSSPOST_SERVICE_SECRET").ok();
    if service_secret.is_none() {
        warn!("CROSSPOST_SERVICE_SECRET not set - publish endpoint disabled");
    }

    let poll_attempts: u32 = std::env::var("PUBLISHER_POLL_ATTEMPTS")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .context("PUBLISHER_POLL_ATTEMPTS must be a number")?;

    let poll_interval_secs: u64 = std::env::var("PUBLISHER_POLL_INTERVAL_SECS")
        .unwrap_or_else(|_| "3".to_string())
        .parse()
        .context("PUBLISHER_POLL_INTERVAL_SECS must be a number")?;

    info!(
        connections_db = %connections_db,
        api_port = api_port,
        poll_attempts = poll_attempts,
        poll_interval_secs = poll_interval_secs,
        "Configuration loaded"
    );

    // Connection store shared with the crosspost service
    let store = Arc::new(
        ConnectionStore::new(&connections_db, &encryption_key)
            .context("Failed to initialize connection store")?,
    );
    info!("Connection store initialized");

    let poll = PollSettings {
        attempts: poll_attempts,
        interval: std::time::Duration::from_secs(poll_interval_secs),
    };
    let registry = Arc::new(PublisherRegistry::with_defaults(poll));

    // Start HTTP API server
    let api_state = ApiState {
        store,
        registry,
        service_secret,
    };
    let router = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port))
        .await
        .context("Failed to bind publish API port")?;
    info!(port = api_port, "Publish API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Publish API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Publisher stopped");

    Ok(())
}
