// Integration tests for the connect initiation flow

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crosspost::api::oauth::{
    AggregatorProvider, ClientCredentials, InstagramProvider, ProviderRegistry, TikTokProvider,
    YouTubeProvider,
};
use crosspost::api::{create_oauth_router, OAuthAppState, StateManager};
use crosspost::connection::{ConnectionStore, Platform};
use std::sync::Arc;
use tower::ServiceExt;

fn test_store() -> Arc<ConnectionStore> {
    let key = BASE64.encode([0u8; 32]);
    Arc::new(ConnectionStore::new(":memory:", &key).unwrap())
}

fn credentials(id_param: &'static str) -> ClientCredentials {
    ClientCredentials {
        client_id: "test_client_id".to_string(),
        client_secret: "test_secret".to_string(),
        id_param,
    }
}

fn full_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(YouTubeProvider::with_endpoints(
        credentials("client_id"),
        "https://yt.example.com/auth".to_string(),
        "https://yt.example.com/token".to_string(),
    )));
    registry.register(Arc::new(InstagramProvider::with_endpoints(
        credentials("client_id"),
        "https://ig.example.com/auth".to_string(),
        "https://ig.example.com/token".to_string(),
    )));
    registry.register(Arc::new(TikTokProvider::with_endpoints(
        credentials("client_key"),
        "https://tt.example.com/auth".to_string(),
        "https://tt.example.com/token".to_string(),
    )));
    registry
}

fn create_test_app(registry: ProviderRegistry, store: Arc<ConnectionStore>) -> Router {
    let state = OAuthAppState {
        store,
        registry: Arc::new(registry),
        state_manager: StateManager::new(600),
        public_base_url: "http://localhost:3000".to_string(),
        ui_status_url: "/accounts".to_string(),
        service_secret: Some("test-secret".to_string()),
    };
    create_oauth_router(state)
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
        .map(str::to_string)
}

#[tokio::test]
async fn test_connect_redirects_with_state_bound_to_creator() {
    for platform in Platform::ALL {
        let app = create_test_app(full_registry(), test_store());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/connect/{}", platform))
                    .header("authorization", "Bearer demo_user")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = response
            .headers()
            .get("location")
            .unwrap()
            .to_str()
            .unwrap();
        let state = query_param(location, "state").expect("state parameter missing");

        // The state round-trips the creator who started the flow
        assert_eq!(
            StateManager::decode_creator(&state).as_deref(),
            Some("demo_user"),
            "state for {} does not decode to the creator",
            platform
        );
    }
}

#[tokio::test]
async fn test_connect_redirect_targets_provider() {
    let app = create_test_app(full_registry(), test_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/tiktok")
                .header("authorization", "Bearer demo_user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();

    assert!(location.starts_with("https://tt.example.com/auth?"));
    assert!(location.contains("client_key=test_client_id"));
    assert!(location.contains(
        "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fconnect%2Ftiktok%2Fcallback"
    ));
}

#[tokio::test]
async fn test_unknown_platform_rejected() {
    let app = create_test_app(full_registry(), test_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/myspace")
                .header("authorization", "Bearer demo_user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unconfigured_platform_is_configuration_error() {
    let app = create_test_app(ProviderRegistry::new(), test_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/youtube")
                .header("authorization", "Bearer demo_user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "not_configured");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("CROSSPOST_OAUTH_YOUTUBE_CLIENT_ID"));
}

#[tokio::test]
async fn test_missing_session_unauthorized() {
    let app = create_test_app(full_registry(), test_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/youtube")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_aggregator_without_profile_is_not_found() {
    let mut registry = full_registry();
    registry.set_aggregator(AggregatorProvider::new(
        "agg-api-key".to_string(),
        "https://connect.example.com/link".to_string(),
    ));
    let app = create_test_app(registry, test_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/aggregator")
                .header("authorization", "Bearer demo_user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_aggregator_with_profile_redirects_to_connect_page() {
    let store = test_store();
    store.set_profile("demo_user", "profile-abc").unwrap();

    let mut registry = full_registry();
    registry.set_aggregator(AggregatorProvider::new(
        "agg-api-key".to_string(),
        "https://connect.example.com/link".to_string(),
    ));
    let app = create_test_app(registry, store);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect/aggregator?platforms=youtube,tiktok")
                .header("authorization", "Bearer demo_user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://connect.example.com/link?"));
    assert!(location.contains("profile_key=profile-abc"));
    assert!(location.contains("platforms=youtube%2Ctiktok"));
}
