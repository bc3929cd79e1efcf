//! OAuth token endpoint client.
//!
//! Handles the two grants every direct provider needs: exchanging an
//! authorization code for tokens, and redeeming a refresh token for a new
//! access token. Providers differ only in endpoint URLs and in the name
//! of the client-id form field (TikTok calls it `client_key`).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Lifetime assumed when a provider omits `expires_in`.
/// Keeps the "expires_at is always set" invariant without guessing long.
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;

/// OAuth client credentials for one provider.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Form field name for the client id ("client_id" for most providers,
    /// "client_key" for TikTok).
    pub id_param: &'static str,
}

/// Tokens obtained from a provider token endpoint.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> TokenGrant {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS);
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    credentials: &ClientCredentials,
) -> Result<TokenGrant> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        (credentials.id_param, credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    tracing::debug!("Exchanging authorization code at {}", token_url);
    post_token_form(token_url, &form).await
}

/// Redeem a refresh token for a new access token.
///
/// Providers may rotate the refresh token; the grant carries the new one
/// when they do.
pub async fn redeem_refresh_token(
    token_url: &str,
    refresh_token: &str,
    credentials: &ClientCredentials,
) -> Result<TokenGrant> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        (credentials.id_param, credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    tracing::debug!("Redeeming refresh token at {}", token_url);
    post_token_form(token_url, &form).await
}

async fn post_token_form(token_url: &str, form: &[(&str, &str)]) -> Result<TokenGrant> {
    let client = reqwest::Client::new();

    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .context("Failed to send token request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!(
            "Token endpoint rejected the request with status {}: {}",
            status,
            body
        ));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token grant received"
    );

    Ok(token_response.into_grant())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            id_param: "client_id",
        }
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "scope": "upload read",
            "token_type": "Bearer"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "ya29.access");
        assert_eq!(response.refresh_token, Some("1//refresh".to_string()));
        assert_eq!(response.expires_in, Some(3599));

        let grant = response.into_grant();
        assert_eq!(grant.scopes, vec!["upload", "read"]);
        assert!(grant.expires_at > Utc::now());
    }

    #[test]
    fn test_token_response_minimal_gets_default_ttl() {
        let json = r#"{"access_token": "token_12345"}"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let grant = response.into_grant();

        assert_eq!(grant.access_token, "token_12345");
        assert!(grant.refresh_token.is_none());
        assert!(grant.scopes.is_empty());
        // Missing expires_in falls back to the one-hour default
        let lifetime = grant.expires_at - Utc::now();
        assert!(lifetime > Duration::minutes(55));
        assert!(lifetime <= Duration::hours(1));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "access_token": "new-access",
                    "refresh_token": "new-refresh",
                    "expires_in": 3600
                }"#,
            )
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let grant = exchange_code(&url, "auth_code", "http://localhost/cb", &test_credentials())
            .await
            .unwrap();

        assert_eq!(grant.access_token, "new-access");
        assert_eq!(grant.refresh_token, Some("new-refresh".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_provider_rejection_quotes_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "invalid_grant", "error_description": "Code expired"}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let err = exchange_code(&url, "stale_code", "http://localhost/cb", &test_credentials())
            .await
            .unwrap_err();

        // Provider error is surfaced verbatim for diagnostics
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.to_string().contains("Code expired"));
    }

    #[tokio::test]
    async fn test_redeem_refresh_token_rotation() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "access_token": "rotated-access",
                    "refresh_token": "rotated-refresh",
                    "expires_in": 7200
                }"#,
            )
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let grant = redeem_refresh_token(&url, "old-refresh", &test_credentials())
            .await
            .unwrap();

        assert_eq!(grant.access_token, "rotated-access");
        assert_eq!(grant.refresh_token, Some("rotated-refresh".to_string()));
    }
}
