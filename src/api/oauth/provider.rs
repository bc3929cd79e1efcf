//! OAuth provider capability and dispatch table.
//!
//! One polymorphic capability (build the authorization URL, exchange a
//! code, redeem a refresh token) with a variant per platform. Platform
//! quirks stay inside the variants: Google wants `access_type=offline` to
//! issue refresh tokens, TikTok names its client id `client_key`. The
//! registry is the single dispatch table, built once at startup.

use super::exchange::{self, ClientCredentials, TokenGrant};
use crate::connection::Platform;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const YOUTUBE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const YOUTUBE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const INSTAGRAM_AUTH_URL: &str = "https://api.instagram.com/oauth/authorize";
const INSTAGRAM_TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";

const TIKTOK_AUTH_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
const TIKTOK_TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";

/// OAuth capability implemented by every direct platform variant.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Platform this provider authorizes.
    fn platform(&self) -> Platform;

    /// Scopes requested during authorization.
    fn scopes(&self) -> &[String];

    /// Build the authorization URL the creator is redirected to.
    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant>;

    /// Redeem a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Read the client credential pair for a platform from the environment.
fn client_env(platform: Platform, id_param: &'static str) -> Option<ClientCredentials> {
    let prefix = platform.as_str().to_uppercase();
    let client_id = std::env::var(format!("CROSSPOST_OAUTH_{}_CLIENT_ID", prefix)).ok()?;
    let client_secret = std::env::var(format!("CROSSPOST_OAUTH_{}_CLIENT_SECRET", prefix)).ok()?;
    Some(ClientCredentials {
        client_id,
        client_secret,
        id_param,
    })
}

/// Assemble a standard authorization-code URL.
fn standard_auth_url(
    auth_url: &str,
    credentials: &ClientCredentials,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    extra_params: &[(&str, &str)],
) -> String {
    let mut url = format!(
        "{}?{}={}&redirect_uri={}&scope={}&state={}&response_type=code",
        auth_url,
        credentials.id_param,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state)
    );

    for (name, value) in extra_params {
        url.push('&');
        url.push_str(name);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }

    url
}

/// YouTube (Google OAuth). Refresh tokens are only issued when the
/// authorization URL asks for offline access with forced consent.
pub struct YouTubeProvider {
    credentials: ClientCredentials,
    auth_url: String,
    token_url: String,
    scopes: Vec<String>,
}

impl YouTubeProvider {
    pub fn from_env() -> Option<Self> {
        let credentials = client_env(Platform::Youtube, "client_id")?;
        Some(Self::with_endpoints(
            credentials,
            YOUTUBE_AUTH_URL.to_string(),
            YOUTUBE_TOKEN_URL.to_string(),
        ))
    }

    /// Construct with explicit endpoints (for testing with a mock server).
    pub fn with_endpoints(
        credentials: ClientCredentials,
        auth_url: String,
        token_url: String,
    ) -> Self {
        Self {
            credentials,
            auth_url,
            token_url,
            scopes: vec![
                "https://www.googleapis.com/auth/youtube.upload".to_string(),
                "https://www.googleapis.com/auth/youtube.readonly".to_string(),
            ],
        }
    }
}

#[async_trait]
impl OAuthProvider for YouTubeProvider {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        standard_auth_url(
            &self.auth_url,
            &self.credentials,
            redirect_uri,
            &self.scopes,
            state,
            &[("access_type", "offline"), ("prompt", "consent")],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        exchange::exchange_code(&self.token_url, code, redirect_uri, &self.credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        exchange::redeem_refresh_token(&self.token_url, refresh_token, &self.credentials).await
    }
}

/// Instagram (Graph-style OAuth).
pub struct InstagramProvider {
    credentials: ClientCredentials,
    auth_url: String,
    token_url: String,
    scopes: Vec<String>,
}

impl InstagramProvider {
    pub fn from_env() -> Option<Self> {
        let credentials = client_env(Platform::Instagram, "client_id")?;
        Some(Self::with_endpoints(
            credentials,
            INSTAGRAM_AUTH_URL.to_string(),
            INSTAGRAM_TOKEN_URL.to_string(),
        ))
    }

    /// Construct with explicit endpoints (for testing with a mock server).
    pub fn with_endpoints(
        credentials: ClientCredentials,
        auth_url: String,
        token_url: String,
    ) -> Self {
        Self {
            credentials,
            auth_url,
            token_url,
            scopes: vec![
                "instagram_business_basic".to_string(),
                "instagram_business_content_publish".to_string(),
            ],
        }
    }
}

#[async_trait]
impl OAuthProvider for InstagramProvider {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        standard_auth_url(
            &self.auth_url,
            &self.credentials,
            redirect_uri,
            &self.scopes,
            state,
            &[],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        exchange::exchange_code(&self.token_url, code, redirect_uri, &self.credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        exchange::redeem_refresh_token(&self.token_url, refresh_token, &self.credentials).await
    }
}

/// TikTok. The client id travels as `client_key` in both the authorization
/// URL and the token forms.
pub struct TikTokProvider {
    credentials: ClientCredentials,
    auth_url: String,
    token_url: String,
    scopes: Vec<String>,
}

impl TikTokProvider {
    pub fn from_env() -> Option<Self> {
        let credentials = client_env(Platform::Tiktok, "client_key")?;
        Some(Self::with_endpoints(
            credentials,
            TIKTOK_AUTH_URL.to_string(),
            TIKTOK_TOKEN_URL.to_string(),
        ))
    }

    /// Construct with explicit endpoints (for testing with a mock server).
    pub fn with_endpoints(
        credentials: ClientCredentials,
        auth_url: String,
        token_url: String,
    ) -> Self {
        Self {
            credentials,
            auth_url,
            token_url,
            scopes: vec![
                "user.info.basic".to_string(),
                "video.publish".to_string(),
                "video.upload".to_string(),
            ],
        }
    }
}

#[async_trait]
impl OAuthProvider for TikTokProvider {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        standard_auth_url(
            &self.auth_url,
            &self.credentials,
            redirect_uri,
            &self.scopes,
            state,
            &[],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        exchange::exchange_code(&self.token_url, code, redirect_uri, &self.credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        exchange::redeem_refresh_token(&self.token_url, refresh_token, &self.credentials).await
    }
}

/// Aggregator-backed connection flow (Ayrshare/Nango-style).
///
/// The aggregator hosts the provider OAuth dance itself; this service only
/// builds the hosted connect-page URL and receives a webhook once linking
/// completes, so the capability here is URL construction. Token exchange
/// and refresh never happen locally for aggregator connections.
pub struct AggregatorProvider {
    api_key: String,
    connect_url: String,
}

impl AggregatorProvider {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("CROSSPOST_AGGREGATOR_API_KEY").ok()?;
        let connect_url = std::env::var("CROSSPOST_AGGREGATOR_CONNECT_URL").ok()?;
        Some(Self::new(api_key, connect_url))
    }

    pub fn new(api_key: String, connect_url: String) -> Self {
        Self {
            api_key,
            connect_url,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Build the hosted connect-page URL for a creator's profile.
    pub fn build_connect_url(
        &self,
        profile_key: &str,
        platforms: &[Platform],
        redirect_uri: &str,
        state: &str,
    ) -> String {
        let platform_list = platforms
            .iter()
            .map(Platform::as_str)
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}?profile_key={}&platforms={}&redirect_uri={}&state={}",
            self.connect_url,
            urlencoding::encode(profile_key),
            urlencoding::encode(&platform_list),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }
}

/// Dispatch table mapping platforms to their OAuth providers.
pub struct ProviderRegistry {
    providers: HashMap<Platform, Arc<dyn OAuthProvider>>,
    aggregator: Option<Arc<AggregatorProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            aggregator: None,
        }
    }

    /// Build the registry from environment credentials.
    ///
    /// Platforms without a configured client id/secret pair are simply
    /// absent from the table; connect attempts for them fail with a
    /// configuration error naming the missing variables.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        if let Some(provider) = YouTubeProvider::from_env() {
            registry.register(Arc::new(provider));
        }
        if let Some(provider) = InstagramProvider::from_env() {
            registry.register(Arc::new(provider));
        }
        if let Some(provider) = TikTokProvider::from_env() {
            registry.register(Arc::new(provider));
        }
        if let Some(aggregator) = AggregatorProvider::from_env() {
            registry.set_aggregator(aggregator);
        }

        for platform in Platform::ALL {
            if !registry.providers.contains_key(&platform) {
                tracing::warn!(
                    platform = %platform,
                    "OAuth credentials not configured, platform unavailable for direct connect"
                );
            }
        }

        registry
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.platform(), provider);
    }

    pub fn set_aggregator(&mut self, aggregator: AggregatorProvider) {
        self.aggregator = Some(Arc::new(aggregator));
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&platform).cloned()
    }

    pub fn aggregator(&self) -> Option<Arc<AggregatorProvider>> {
        self.aggregator.clone()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials(id_param: &'static str) -> ClientCredentials {
        ClientCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            id_param,
        }
    }

    #[test]
    fn test_youtube_auth_url_requests_offline_access() {
        let provider = YouTubeProvider::with_endpoints(
            test_credentials("client_id"),
            "https://example.com/oauth/authorize".to_string(),
            "https://example.com/oauth/token".to_string(),
        );

        let url = provider.build_auth_url("state-123", "http://localhost:3000/connect/youtube/callback");

        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fconnect%2Fyoutube%2Fcallback"
        ));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fyoutube.upload%20"));
    }

    #[test]
    fn test_tiktok_auth_url_uses_client_key() {
        let provider = TikTokProvider::with_endpoints(
            test_credentials("client_key"),
            "https://example.com/oauth/authorize".to_string(),
            "https://example.com/oauth/token".to_string(),
        );

        let url = provider.build_auth_url("state-456", "http://localhost:3000/connect/tiktok/callback");

        assert!(url.contains("client_key=test_client_id"));
        assert!(!url.contains("client_id="));
        assert!(url.contains("scope=user.info.basic%20video.publish%20video.upload"));
    }

    #[test]
    fn test_instagram_auth_url_has_no_extra_params() {
        let provider = InstagramProvider::with_endpoints(
            test_credentials("client_id"),
            "https://example.com/oauth/authorize".to_string(),
            "https://example.com/oauth/token".to_string(),
        );

        let url = provider.build_auth_url("state-789", "http://localhost:3000/cb");

        assert!(url.contains("state=state-789"));
        assert!(!url.contains("access_type"));
    }

    #[test]
    fn test_registry_dispatch() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.get(Platform::Youtube).is_none());

        registry.register(Arc::new(YouTubeProvider::with_endpoints(
            test_credentials("client_id"),
            "https://example.com/auth".to_string(),
            "https://example.com/token".to_string(),
        )));

        let provider = registry.get(Platform::Youtube).unwrap();
        assert_eq!(provider.platform(), Platform::Youtube);
        assert!(registry.get(Platform::Tiktok).is_none());
    }

    #[test]
    fn test_aggregator_connect_url() {
        let aggregator = AggregatorProvider::new(
            "agg-api-key".to_string(),
            "https://connect.example.com/link".to_string(),
        );

        let url = aggregator.build_connect_url(
            "profile-abc",
            &[Platform::Youtube, Platform::Tiktok],
            "http://localhost:3000/connect/aggregator/callback",
            "state-000",
        );

        assert!(url.starts_with("https://connect.example.com/link?"));
        assert!(url.contains("profile_key=profile-abc"));
        assert!(url.contains("platforms=youtube%2Ctiktok"));
        assert!(url.contains("state=state-000"));
    }
}
