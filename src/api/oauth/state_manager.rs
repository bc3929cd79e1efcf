//! OAuth state management for CSRF protection.
//!
//! The state value that round-trips through the provider redirect is
//! `<nonce>.<base64url(creator_id)>`: a single-use random nonce held
//! server-side with a TTL, plus the creator id encoded (not encrypted)
//! so the callback can prove the value decodes back to the creator who
//! started the flow. Tampering with either half invalidates the state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Server-side record for an issued state value.
#[derive(Clone, Debug)]
pub struct StateEntry {
    /// Connect target the flow was started for ("youtube", "aggregator", ...)
    pub target: String,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth state manager with automatic expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager.
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    /// Issue a state value binding a connect flow to a creator.
    pub fn issue(&self, target: &str, creator_id: &str) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let entry = StateEntry {
            target: target.to_string(),
            creator_id: creator_id.to_string(),
            created_at: Utc::now(),
        };

        let mut states = self.states.lock().unwrap();
        states.insert(nonce.clone(), entry);

        format!("{}.{}", nonce, URL_SAFE_NO_PAD.encode(creator_id))
    }

    /// Decode the creator id embedded in a state value.
    ///
    /// Pure decoding: no lookup, no consumption. The callback uses
    /// [`StateManager::validate_and_consume`] to check it against the
    /// server-side entry.
    pub fn decode_creator(state: &str) -> Option<String> {
        let (_, encoded) = state.split_once('.')?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Validate and consume a state value.
    ///
    /// Returns the entry only if the nonce exists, has not expired, and
    /// the embedded creator matches the one the flow was issued for. The
    /// entry is removed either way (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let (nonce, _) = state.split_once('.')?;
        let claimed_creator = Self::decode_creator(state)?;

        let entry = {
            let mut states = self.states.lock().unwrap();
            states.remove(nonce)?
        };

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        // Embedded creator must match what the flow was issued for
        if entry.creator_id != claimed_creator {
            return None;
        }

        Some(entry)
    }

    /// Clean up expired states (called periodically)
    pub fn cleanup_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();

        states.retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    /// Get count of active states (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(
            "OAuth state cleanup complete, {} states remaining",
            manager.count()
        );
    }
}
