//! In-memory token storage with expiry tracking.
//!
//! Tokens are keyed by the configuration that produced them
//! ([`AuthenticationConfig::cache_key`](tether_domain::AuthenticationConfig::cache_key)).
//! A token inside the safety buffer before its expiry is treated as absent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tether_domain::{AccessToken, EngineSettings};
use tokio::sync::RwLock;

/// Default seconds before expiry at which a token stops being served.
pub const DEFAULT_SAFETY_BUFFER_SECS: i64 = 60;

/// Thread-safe in-memory token store.
#[derive(Debug, Clone)]
pub struct TokenCache {
    tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    safety_buffer: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    /// Create a new token cache with the default safety buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_safety_buffer(Duration::seconds(DEFAULT_SAFETY_BUFFER_SECS))
    }

    /// Create with a custom safety buffer.
    #[must_use]
    pub fn with_safety_buffer(safety_buffer: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            safety_buffer,
        }
    }

    /// Create with the safety buffer configured in `settings`.
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let buffer = Duration::from_std(settings.token_safety_buffer())
            .unwrap_or_else(|_| Duration::seconds(DEFAULT_SAFETY_BUFFER_SECS));
        Self::with_safety_buffer(buffer)
    }

    /// Returns the safety buffer.
    #[must_use]
    pub const fn safety_buffer(&self) -> Duration {
        self.safety_buffer
    }

    /// Store a token with the given key.
    pub async fn store(&self, key: impl Into<String>, token: AccessToken) {
        self.tokens.write().await.insert(key.into(), token);
    }

    /// Get a token by key, fresh or not.
    pub async fn get(&self, key: &str) -> Option<AccessToken> {
        self.tokens.read().await.get(key).cloned()
    }

    /// Get a token that is still outside the safety buffer at `now`.
    pub async fn get_valid(&self, key: &str, now: DateTime<Utc>) -> Option<AccessToken> {
        self.tokens
            .read()
            .await
            .get(key)
            .filter(|t| !t.is_expired_or_expiring(self.safety_buffer, now))
            .cloned()
    }

    /// Returns the stale token for `key` if it can be refreshed.
    pub async fn refreshable(&self, key: &str, now: DateTime<Utc>) -> Option<AccessToken> {
        self.tokens
            .read()
            .await
            .get(key)
            .filter(|t| t.is_expired_or_expiring(self.safety_buffer, now) && t.can_refresh())
            .cloned()
    }

    /// Remove a token.
    pub async fn remove(&self, key: &str) -> Option<AccessToken> {
        self.tokens.write().await.remove(key)
    }

    /// Clear all tokens.
    pub async fn clear(&self) {
        self.tokens.write().await.clear();
    }

    /// Number of stored tokens.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}
