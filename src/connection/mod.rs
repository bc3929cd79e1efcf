//! Connection records linking creators to external platforms.
//!
//! A `Connection` is the stored credential set produced by a completed
//! authorization flow: one row per (creator, platform), holding the access
//! token, the optional refresh token, the expiry instant, the granted
//! scopes, and the lifecycle status.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       ConnectionStore                    │
//! │  - upsert / get / list / delete          │
//! │  - versioned CAS writes for refresh      │
//! │  - aggregator profile registry           │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!      (seal)               (open)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Encryption Module                  │
//! │  - AES-256-GCM, nonce-prefixed blobs     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  - tokens encrypted at rest              │
//! │  - UNIQUE(creator_id, platform)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one connection per (creator_id, platform).
//! - `expires_at` is always set: a row only exists once an access token was
//!   issued, and token grants without an explicit lifetime get a default.
//! - A row with `status = requires_reconnect` must never be used for
//!   publish calls; the creator has to re-authorize.
//! - `AccessExpired` is never persisted; it is derived from `expires_at`
//!   at read time via [`Connection::effective_status`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod encryption;
mod store;

pub use encryption::{open, seal, validate_key};
pub use store::{ConnectionStore, VersionedConnection};

/// External platform a creator can publish to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl Platform {
    /// All supported platforms, in a stable order.
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Instagram, Platform::Tiktok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Parse a platform name, `None` for anything outside the supported set.
    pub fn parse(name: &str) -> Option<Platform> {
        match name {
            "youtube" => Some(Platform::Youtube),
            "instagram" => Some(Platform::Instagram),
            "tiktok" => Some(Platform::Tiktok),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Tokens are stored and believed valid.
    Connected,
    /// The access token has passed `expires_at`; a refresh may revive it.
    AccessExpired,
    /// Refresh is impossible or was rejected; the creator must re-authorize.
    RequiresReconnect,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::AccessExpired => "access_expired",
            ConnectionStatus::RequiresReconnect => "requires_reconnect",
        }
    }

    pub fn parse(name: &str) -> Option<ConnectionStatus> {
        match name {
            "connected" => Some(ConnectionStatus::Connected),
            "access_expired" => Some(ConnectionStatus::AccessExpired),
            "requires_reconnect" => Some(ConnectionStatus::RequiresReconnect),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the connection was authorized.
///
/// Aggregator-mediated connections share the same record shape as direct
/// OAuth ones; their access token is the aggregator profile key and they
/// carry no refresh token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionOrigin {
    Direct,
    Aggregator,
}

impl ConnectionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionOrigin::Direct => "direct",
            ConnectionOrigin::Aggregator => "aggregator",
        }
    }

    pub fn parse(name: &str) -> Option<ConnectionOrigin> {
        match name {
            "direct" => Some(ConnectionOrigin::Direct),
            "aggregator" => Some(ConnectionOrigin::Aggregator),
            _ => None,
        }
    }
}

/// Stored credential set for one (creator, platform) pair.
///
/// # Security
/// - Tokens are encrypted at rest in the connection store
/// - Never expose tokens via public APIs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    /// Opaque identifier of the creator who authorized the connection.
    pub creator_id: String,

    /// Platform the credentials are valid for.
    pub platform: Platform,

    /// Access token used for publish calls (aggregator profile key for
    /// aggregator-mediated rows).
    pub access_token: String,

    /// Refresh token, when the platform issued one.
    pub refresh_token: Option<String>,

    /// Instant at which `access_token` stops being valid.
    pub expires_at: DateTime<Utc>,

    /// Permission scopes granted during authorization.
    pub scopes: Vec<String>,

    /// Persisted lifecycle status (`Connected` or `RequiresReconnect`).
    pub status: ConnectionStatus,

    /// Whether the row came from direct OAuth or an aggregator webhook.
    pub origin: ConnectionOrigin,
}

impl Connection {
    /// Status as seen by callers: a connected row whose access token has
    /// passed `expires_at` reports `AccessExpired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ConnectionStatus {
        match self.status {
            ConnectionStatus::Connected if now >= self.expires_at => {
                ConnectionStatus::AccessExpired
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_platform_parse_roundtrip() {
        for platform in Platform::ALL {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::parse("myspace"), None);
        assert_eq!(Platform::parse(""), None);
        assert_eq!(Platform::parse("YouTube"), None);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            ConnectionStatus::Connected,
            ConnectionStatus::AccessExpired,
            ConnectionStatus::RequiresReconnect,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConnectionStatus::parse("disconnected"), None);
    }

    #[test]
    fn test_effective_status_derives_expiry() {
        let now = Utc::now();
        let mut conn = Connection {
            creator_id: "demo_user".to_string(),
            platform: Platform::Youtube,
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: now + Duration::hours(1),
            scopes: vec![],
            status: ConnectionStatus::Connected,
            origin: ConnectionOrigin::Direct,
        };

        assert_eq!(conn.effective_status(now), ConnectionStatus::Connected);
        assert_eq!(
            conn.effective_status(now + Duration::hours(2)),
            ConnectionStatus::AccessExpired
        );

        // A flagged row never reports expiry, only the reconnect requirement
        conn.status = ConnectionStatus::RequiresReconnect;
        assert_eq!(
            conn.effective_status(now + Duration::hours(2)),
            ConnectionStatus::RequiresReconnect
        );
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Tiktok).unwrap();
        assert_eq!(json, "\"tiktok\"");
        let parsed: Platform = serde_json::from_str("\"youtube\"").unwrap();
        assert_eq!(parsed, Platform::Youtube);
    }
}
