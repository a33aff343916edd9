//! Session tokens and principal lookup.
//!
//! The gateway only needs [`SessionLookup`]: turn a bearer token into a
//! currently valid [`Principal`]. [`SessionStore`] is the in-memory
//! implementation used by the binary and the tests.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use protocol::Principal;
use rand::RngCore;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Token length in random bytes before encoding.
const TOKEN_BYTES: usize = 32;

/// Lifetime of sessions issued without an explicit duration.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(24 * 3600);

/// Lookup of an authenticated principal by session token.
///
/// Implementations must never return an expired principal.
pub trait SessionLookup: Send + Sync {
    /// Return the principal for `token`, or `None` if the token is unknown
    /// or expired.
    fn validate(&self, token: &str) -> Option<Principal>;
}

/// Thread-safe in-memory session store.
pub struct SessionStore {
    /// Map of token to principal.
    sessions: DashMap<String, Principal>,
    /// Lifetime used by [`issue_session`](Self::issue_session).
    default_duration: Duration,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            default_duration: DEFAULT_SESSION_DURATION,
        }
    }

    /// Set the lifetime of sessions issued by
    /// [`issue_session`](Self::issue_session).
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// The lifetime of sessions issued without an explicit duration.
    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Issue a session for `principal_id` with the store's default lifetime.
    pub fn issue_session(&self, principal_id: &str, scopes: Vec<String>) -> String {
        self.create_session(principal_id, scopes, self.default_duration)
    }

    /// Issue a session for `principal_id` valid for `duration`.
    ///
    /// Returns the bearer token.
    pub fn create_session(&self, principal_id: &str, scopes: Vec<String>, duration: Duration) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let now = unix_now();
        let mut principal = Principal::new(
            Uuid::new_v4().to_string(),
            principal_id,
            now.saturating_add(duration.as_secs()),
        );
        principal.created_at = now;
        principal.scopes = scopes;

        info!(
            principal = principal_id,
            session_id = %principal.session_id,
            expires_at = principal.expires_at,
            "Created session"
        );
        self.sessions.insert(token.clone(), principal);
        token
    }

    /// Return the principal for a token, removing it if it has expired.
    pub fn validate_session(&self, token: &str) -> Option<Principal> {
        let principal = self.sessions.get(token).map(|entry| entry.value().clone())?;

        if principal.is_expired_at(unix_now()) {
            self.sessions.remove(token);
            debug!(session_id = %principal.session_id, "Removed expired session");
            return None;
        }

        Some(principal)
    }

    /// Delete a session. Returns whether it existed.
    pub fn revoke_session(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, principal)) => {
                info!(session_id = %principal.session_id, "Revoked session");
                true
            }
            None => false,
        }
    }

    /// Set an attribute on a session's principal. Returns whether the
    /// session exists.
    pub fn set_attribute(&self, token: &str, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.sessions.get_mut(token) {
            Some(mut entry) => {
                entry.attributes.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Remove every expired session. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = unix_now();
        let before = self.sessions.len();
        self.sessions.retain(|_, principal| !principal.is_expired_at(now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        removed
    }

    /// Number of stored sessions, including expired ones not yet purged.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Starts a background task that periodically purges expired sessions.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                store.purge_expired();
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLookup for SessionStore {
    fn validate(&self, token: &str) -> Option<Principal> {
        self.validate_session(token)
    }
}

impl<T: SessionLookup + ?Sized> SessionLookup for Arc<T> {
    fn validate(&self, token: &str) -> Option<Principal> {
        (**self).validate(token)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
