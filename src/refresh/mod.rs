//! Token refresher.
//!
//! One refresh attempt per invocation, no retry loop, so a provider
//! rejecting an invalid refresh token is never hammered. A per-connection
//! single-flight gate collapses concurrent attempts, and the store's
//! version CAS is the backstop: a failed exchange can never overwrite
//! tokens written by a concurrently succeeding one.

use crate::api::oauth::ProviderRegistry;
use crate::connection::{ConnectionStatus, ConnectionStore, Platform};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

/// Outcome of a refresh attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token is stored.
    Refreshed { expires_at: DateTime<Utc> },
    /// No refresh token, the provider rejected the refresh, or the
    /// connection was already flagged. The creator must re-authorize.
    ReconnectRequired,
    /// A concurrent refresh for the same connection is in flight;
    /// the caller should retry shortly.
    InFlight,
}

/// Refresh failures that are not lifecycle outcomes.
#[derive(Debug)]
pub enum RefreshError {
    /// No stored connection for (creator, platform).
    NotFound,
    /// No provider registered for the platform.
    NotConfigured(Platform),
    /// Store or crypto failure.
    Internal(anyhow::Error),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::NotFound => write!(f, "No connection found"),
            RefreshError::NotConfigured(platform) => {
                write!(f, "No OAuth provider configured for '{}'", platform)
            }
            RefreshError::Internal(e) => write!(f, "Refresh failed: {}", e),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<anyhow::Error> for RefreshError {
    fn from(e: anyhow::Error) -> Self {
        RefreshError::Internal(e)
    }
}

/// Single-flight gate keyed by (creator_id, platform).
///
/// Holding a permit marks a refresh as in flight; the permit removes the
/// marker on drop, including when the refresh future is cancelled.
pub struct RefreshGate {
    inflight: DashMap<(String, Platform), ()>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Try to claim the refresh slot for a connection.
    pub fn try_acquire(&self, creator_id: &str, platform: Platform) -> Option<RefreshPermit<'_>> {
        let key = (creator_id.to_string(), platform);
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(RefreshPermit { gate: self, key })
            }
        }
    }
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker for an in-flight refresh.
pub struct RefreshPermit<'a> {
    gate: &'a RefreshGate,
    key: (String, Platform),
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.gate.inflight.remove(&self.key);
    }
}

/// Run one refresh attempt for a stored connection.
pub async fn refresh_connection(
    store: &ConnectionStore,
    registry: &ProviderRegistry,
    gate: &RefreshGate,
    creator_id: &str,
    platform: Platform,
) -> Result<RefreshOutcome, RefreshError> {
    let Some(_permit) = gate.try_acquire(creator_id, platform) else {
        debug!(creator = %creator_id, platform = %platform, "Refresh already in flight");
        return Ok(RefreshOutcome::InFlight);
    };

    let versioned = store
        .get(creator_id, platform)?
        .ok_or(RefreshError::NotFound)?;
    let connection = versioned.connection;

    if connection.status == ConnectionStatus::RequiresReconnect {
        debug!(
            creator = %creator_id,
            platform = %platform,
            "Connection already flagged for re-authorization"
        );
        return Ok(RefreshOutcome::ReconnectRequired);
    }

    // No refresh token: nothing to redeem, flag immediately without
    // touching the network.
    let Some(refresh_token) = connection.refresh_token else {
        info!(
            creator = %creator_id,
            platform = %platform,
            "No refresh token stored, flagging for re-authorization"
        );
        store.mark_requires_reconnect(creator_id, platform, versioned.version)?;
        return Ok(RefreshOutcome::ReconnectRequired);
    };

    let provider = registry
        .get(platform)
        .ok_or(RefreshError::NotConfigured(platform))?;

    match provider.refresh(&refresh_token).await {
        Ok(grant) => {
            let applied = store.update_tokens(
                creator_id,
                platform,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.expires_at,
                versioned.version,
            )?;

            if applied {
                info!(
                    creator = %creator_id,
                    platform = %platform,
                    expires_at = %grant.expires_at,
                    "Access token refreshed"
                );
                return Ok(RefreshOutcome::Refreshed {
                    expires_at: grant.expires_at,
                });
            }

            // Lost the CAS race: the stored row is authoritative.
            let stored = store
                .get(creator_id, platform)?
                .ok_or(RefreshError::NotFound)?;
            debug!(
                creator = %creator_id,
                platform = %platform,
                "Concurrent writer won, reporting stored state"
            );
            match stored.connection.status {
                ConnectionStatus::RequiresReconnect => Ok(RefreshOutcome::ReconnectRequired),
                _ => Ok(RefreshOutcome::Refreshed {
                    expires_at: stored.connection.expires_at,
                }),
            }
        }
        Err(e) => {
            warn!(
                creator = %creator_id,
                platform = %platform,
                error = %e,
                "Provider rejected the refresh, flagging for re-authorization"
            );
            // CAS keeps a concurrently refreshed token intact
            store.mark_requires_reconnect(creator_id, platform, versioned.version)?;
            Ok(RefreshOutcome::ReconnectRequired)
        }
    }
}
