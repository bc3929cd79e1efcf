// Integration tests for the OAuth callback and aggregator webhook

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crosspost::api::oauth::{ClientCredentials, ProviderRegistry, YouTubeProvider};
use crosspost::api::{create_oauth_router, OAuthAppState, StateManager};
use crosspost::connection::{ConnectionOrigin, ConnectionStatus, ConnectionStore, Platform};
use std::sync::Arc;
use tower::ServiceExt;

fn test_store() -> Arc<ConnectionStore> {
    let key = BASE64.encode([0u8; 32]);
    Arc::new(ConnectionStore::new(":memory:", &key).unwrap())
}

fn youtube_registry(token_url: &str) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(YouTubeProvider::with_endpoints(
        ClientCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            id_param: "client_id",
        },
        "https://yt.example.com/auth".to_string(),
        token_url.to_string(),
    )));
    registry
}

struct TestApp {
    router: Router,
    state_manager: StateManager,
    store: Arc<ConnectionStore>,
}

fn create_test_app(registry: ProviderRegistry, store: Arc<ConnectionStore>) -> TestApp {
    let state_manager = StateManager::new(600);
    let state = OAuthAppState {
        store: Arc::clone(&store),
        registry: Arc::new(registry),
        state_manager: state_manager.clone(),
        public_base_url: "http://localhost:3000".to_string(),
        ui_status_url: "/accounts".to_string(),
        service_secret: Some("test-secret".to_string()),
    };
    TestApp {
        router: create_oauth_router(state),
        state_manager,
        store,
    }
}

fn callback_request(platform: &str, code: &str, state: &str) -> Request<Body> {
    Request::builder()
        .uri(format!(
            "/connect/{}/callback?code={}&state={}",
            platform, code, state
        ))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_callback_exchanges_code_and_stores_connection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "access_token": "ya29.fresh",
                "refresh_token": "1//refresh",
                "expires_in": 3600,
                "scope": "upload"
            }"#,
        )
        .create_async()
        .await;

    let app = create_test_app(
        youtube_registry(&format!("{}/token", server.url())),
        test_store(),
    );

    let state = app.state_manager.issue("youtube", "demo_user");
    let response = app
        .router
        .oneshot(callback_request("youtube", "auth_code_1", &state))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(location, "/accounts?success=true&platform=youtube");

    let stored = app
        .store
        .get("demo_user", Platform::Youtube)
        .unwrap()
        .expect("connection not stored");
    assert_eq!(stored.connection.access_token, "ya29.fresh");
    assert_eq!(stored.connection.refresh_token.as_deref(), Some("1//refresh"));
    assert_eq!(stored.connection.status, ConnectionStatus::Connected);
    assert_eq!(stored.connection.origin, ConnectionOrigin::Direct);
    assert_eq!(stored.connection.scopes, vec!["upload"]);
    assert!(stored.connection.expires_at > chrono::Utc::now());
}

#[tokio::test]
async fn test_replayed_code_yields_single_connection_row() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "ya29.fresh", "expires_in": 3600}"#)
        .expect(2)
        .create_async()
        .await;

    let store = test_store();
    let app = create_test_app(
        youtube_registry(&format!("{}/token", server.url())),
        Arc::clone(&store),
    );

    // Same authorization code delivered twice (fresh state each time;
    // states are single-use)
    let state1 = app.state_manager.issue("youtube", "demo_user");
    let response = app
        .router
        .clone()
        .oneshot(callback_request("youtube", "auth_code_1", &state1))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let state2 = app.state_manager.issue("youtube", "demo_user");
    let response = app
        .router
        .oneshot(callback_request("youtube", "auth_code_1", &state2))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    mock.assert_async().await;

    // Exactly one row for (creator, platform)
    let all = store.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0], ("demo_user".to_string(), Platform::Youtube));
}

#[tokio::test]
async fn test_callback_rejects_unknown_state() {
    let app = create_test_app(youtube_registry("http://localhost:1/token"), test_store());

    let response = app
        .router
        .oneshot(callback_request("youtube", "auth_code_1", "bogus.ZGVtbw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_rejects_tampered_state() {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let app = create_test_app(youtube_registry("http://localhost:1/token"), test_store());

    let state = app.state_manager.issue("youtube", "alice");
    let nonce = state.split_once('.').unwrap().0;
    let forged = format!("{}.{}", nonce, URL_SAFE_NO_PAD.encode("mallory"));

    let response = app
        .router
        .oneshot(callback_request("youtube", "auth_code_1", &forged))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_rejects_target_mismatch() {
    let app = create_test_app(youtube_registry("http://localhost:1/token"), test_store());

    // State issued for tiktok, delivered to the youtube callback
    let state = app.state_manager.issue("tiktok", "demo_user");
    let response = app
        .router
        .oneshot(callback_request("youtube", "auth_code_1", &state))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provider_denial_redirects_to_failure_page() {
    let app = create_test_app(youtube_registry("http://localhost:1/token"), test_store());

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connect/youtube/callback?error=access_denied&error_description=User+cancelled")
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
    assert_eq!(location, "/accounts?success=false&platform=youtube");
}

#[tokio::test]
async fn test_exchange_failure_surfaces_provider_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "invalid_grant", "error_description": "Code expired"}"#)
        .create_async()
        .await;

    let app = create_test_app(
        youtube_registry(&format!("{}/token", server.url())),
        test_store(),
    );

    let state = app.state_manager.issue("youtube", "demo_user");
    let response = app
        .router
        .oneshot(callback_request("youtube", "stale_code", &state))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "provider_error");
    assert!(json["error"].as_str().unwrap().contains("invalid_grant"));
}

#[tokio::test]
async fn test_aggregator_webhook_upserts_connections() {
    let store = test_store();
    store.set_profile("demo_user", "profile-abc").unwrap();

    let app = create_test_app(ProviderRegistry::new(), Arc::clone(&store));

    let payload = serde_json::json!({
        "creator_id": "demo_user",
        "profile_key": "profile-abc",
        "platforms": ["youtube", "tiktok"],
    });

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/connect/aggregator/callback")
                .header("content-type", "application/json")
                .header("x-service-secret", "test-secret")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    for platform in [Platform::Youtube, Platform::Tiktok] {
        let stored = store.get("demo_user", platform).unwrap().unwrap();
        assert_eq!(stored.connection.origin, ConnectionOrigin::Aggregator);
        assert_eq!(stored.connection.status, ConnectionStatus::Connected);
        assert_eq!(stored.connection.access_token, "profile-abc");
        assert!(stored.connection.refresh_token.is_none());
        assert!(stored.connection.expires_at > chrono::Utc::now());
    }
    assert!(store.get("demo_user", Platform::Instagram).unwrap().is_none());
}

#[tokio::test]
async fn test_aggregator_browser_return_redirects_to_status_page() {
    let app = create_test_app(ProviderRegistry::new(), test_store());

    let state = app.state_manager.issue("aggregator", "demo_user");
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/connect/aggregator/callback?state={}", state))
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
    assert_eq!(location, "/accounts?success=true&platform=aggregator");
}

#[tokio::test]
async fn test_aggregator_webhook_requires_secret() {
    let store = test_store();
    store.set_profile("demo_user", "profile-abc").unwrap();

    let app = create_test_app(ProviderRegistry::new(), store);

    let payload = serde_json::json!({
        "creator_id": "demo_user",
        "profile_key": "profile-abc",
        "platforms": ["youtube"],
    });

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/connect/aggregator/callback")
                .header("content-type", "application/json")
                .header("x-service-secret", "wrong-secret")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_aggregator_webhook_rejects_mismatched_profile() {
    let store = test_store();
    store.set_profile("demo_user", "profile-abc").unwrap();

    let app = create_test_app(ProviderRegistry::new(), Arc::clone(&store));

    let payload = serde_json::json!({
        "creator_id": "demo_user",
        "profile_key": "someone-elses-profile",
        "platforms": ["youtube"],
    });

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/connect/aggregator/callback")
                .header("content-type", "application/json")
                .header("x-service-secret", "test-secret")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(store.get("demo_user", Platform::Youtube).unwrap().is_none());
}
