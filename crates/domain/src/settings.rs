//! Engine settings
//!
//! Defaults applied when a handshake does not override them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::handshake::RetryPolicyConfig;

/// Settings for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Retry policy used when a handshake has none.
    #[serde(default)]
    pub retry: RetryPolicyConfig,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Finished runs kept in the history ring.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Seconds before expiry at which cached tokens count as expired.
    #[serde(default = "default_token_safety_buffer_secs")]
    pub token_safety_buffer_secs: u64,

    /// Fail on unresolved placeholders.
    #[serde(default)]
    pub strict_placeholders: bool,

    /// Substitute for unresolved placeholders in lenient mode.
    #[serde(default)]
    pub placeholder_fallback: String,

    /// Field names treated as sensitive on top of the built-in list.
    #[serde(default)]
    pub sensitive_fields: Vec<String>,

    /// Maximum nesting depth the sanitizer descends into.
    #[serde(default = "default_sanitizer_max_depth")]
    pub sanitizer_max_depth: usize,

    /// User agent sent when a command sets none.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

const fn default_history_capacity() -> usize {
    100
}

const fn default_token_safety_buffer_secs() -> u64 {
    60
}

const fn default_sanitizer_max_depth() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("tether/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicyConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            history_capacity: default_history_capacity(),
            token_safety_buffer_secs: default_token_safety_buffer_secs(),
            strict_placeholders: false,
            placeholder_fallback: String::new(),
            sensitive_fields: Vec::new(),
            sanitizer_max_depth: default_sanitizer_max_depth(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineSettings {
    /// Per-attempt timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Token safety buffer.
    #[must_use]
    pub const fn token_safety_buffer(&self) -> Duration {
        Duration::from_secs(self.token_safety_buffer_secs)
    }
}
