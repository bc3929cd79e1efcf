//! Caller identity extraction.
//!
//! Two kinds of callers reach this service: creators, who present a bearer
//! session token on browser-facing routes, and trusted server-to-server
//! callers (the publisher, workflow engines, aggregator webhooks), who
//! present a shared service secret. Identity is always an explicit input
//! to handlers; nothing is read from ambient cookie state.

use axum::http::HeaderMap;


/// Header carrying the shared secret for server-to-server calls.
pub const SERVICE_SECRET_HEADER: &str = "x-service-secret";

/// Extract the creator identity from the HTTP Authorization header.
///
/// Expected format: "Authorization: Bearer <creator-session-token>".
/// The session token is the opaque creator identifier issued at login.
pub fn extract_creator(headers: &HeaderMap) -> Result<String, IdentityError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(IdentityError::Missing)?
        .to_str()
        .map_err(|_| IdentityError::InvalidFormat)?;

    parse_bearer(auth_header)
}

/// Verify the shared service secret for a server-to-server call.
///
/// Comparison is constant-time so the secret cannot be guessed
/// byte-by-byte through timing.
pub fn verify_service_secret(headers: &HeaderMap, expected: &str) -> Result<(), IdentityError> {
    let presented = headers
        .get(SERVICE_SECRET_HEADER)
        .ok_or(IdentityError::Missing)?
        .to_str()
        .map_err(|_| IdentityError::InvalidFormat)?;

    if presented.is_empty() {
        return Err(IdentityError::Empty);
    }

    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(IdentityError::SecretMismatch);
    }

    Ok(())
}

/// Parse "Bearer <token>" from an Authorization header value.
fn parse_bearer(header_value: &str) -> Result<String, IdentityError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(IdentityError::InvalidFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(IdentityError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(IdentityError::Empty);
    }

    Ok(token.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Identity extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum IdentityError {
    /// Authorization header or secret header not present
    Missing,
    /// Invalid format (not "Bearer <token>" or non-ASCII header value)
    InvalidFormat,
    /// Token or secret is empty
    Empty,
    /// Service secret does not match the configured value
    SecretMismatch,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Missing => write!(f, "Credentials not provided"),
            IdentityError::InvalidFormat => write!(f, "Invalid credential format"),
            IdentityError::Empty => write!(f, "Credential is empty"),
            IdentityError::SecretMismatch => write!(f, "Service secret mismatch"),
        }
    }
}

impl std::error::Error for IdentityError {}
