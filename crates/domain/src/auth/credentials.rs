//! Credentials produced by authentication

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

/// Returns true once `now + buffer` has reached `expiry`.
#[must_use]
pub fn is_expired(expiry: DateTime<Utc>, buffer: Duration, now: DateTime<Utc>) -> bool {
    now + buffer >= expiry
}

/// `OAuth2` access token with metadata for expiry tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The access token string
    pub access_token: Secret,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// When the token expires (if known)
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: Option<Secret>,
    /// Scopes granted by this token
    #[serde(default)]
    pub scopes: Vec<String>,
    /// When this token was obtained
    pub obtained_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token obtained at `now`.
    #[must_use]
    pub fn new(
        access_token: impl Into<Secret>,
        token_type: impl Into<String>,
        expires_in_secs: Option<u64>,
        refresh_token: Option<Secret>,
        scopes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at,
            refresh_token,
            scopes,
            obtained_at: now,
        }
    }

    /// Check if the token is expired or will expire within the given buffer.
    ///
    /// Tokens without a known expiry never expire.
    #[must_use]
    pub fn is_expired_or_expiring(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| is_expired(expires_at, buffer, now))
    }

    /// Check if the token can be refreshed.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns the Authorization header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        let token_type =
            if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
                "Bearer"
            } else {
                self.token_type.as_str()
            };
        format!("{token_type} {}", self.access_token.expose())
    }

    /// Converts the token into request credentials.
    #[must_use]
    pub fn to_credentials(&self) -> Credentials {
        Credentials {
            material: CredentialMaterial::Header {
                name: "Authorization".to_string(),
                value: Secret::new(self.authorization_header()),
            },
            refresh: Some(RefreshMetadata {
                refresh_token: self.refresh_token.clone(),
                expires_at: self.expires_at,
                scopes: self.scopes.clone(),
            }),
        }
    }
}

/// What a strategy attaches to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialMaterial {
    /// No authentication needed.
    #[default]
    None,
    /// Add this header to the request.
    Header {
        /// Header name (e.g., "Authorization").
        name: String,
        /// Header value.
        value: Secret,
    },
    /// Add this query parameter.
    QueryParam {
        /// Query parameter name.
        name: String,
        /// Query parameter value.
        value: Secret,
    },
    /// Add this `name=value` pair to the `Cookie` header.
    Cookie {
        /// Cookie name.
        name: String,
        /// Cookie value.
        value: Secret,
    },
}

/// Metadata needed to renew credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefreshMetadata {
    /// Refresh token, when the provider issued one.
    pub refresh_token: Option<Secret>,
    /// Expiry of the current material.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Opaque credentials handed from `authenticate` to `execute_request`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Material attached to requests.
    pub material: CredentialMaterial,
    /// Renewal metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshMetadata>,
}

impl Credentials {
    /// Credentials that attach nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Credentials carried in a header.
    #[must_use]
    pub fn header(name: impl Into<String>, value: impl Into<Secret>) -> Self {
        Self {
            material: CredentialMaterial::Header {
                name: name.into(),
                value: value.into(),
            },
            refresh: None,
        }
    }

    /// Credentials carried in a query parameter.
    #[must_use]
    pub fn query_param(name: impl Into<String>, value: impl Into<Secret>) -> Self {
        Self {
            material: CredentialMaterial::QueryParam {
                name: name.into(),
                value: value.into(),
            },
            refresh: None,
        }
    }

    /// Returns true when the material has expired (with `buffer` slack).
    #[must_use]
    pub fn is_expired(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        self.refresh
            .as_ref()
            .and_then(|r| r.expires_at)
            .is_some_and(|expires_at| is_expired(expires_at, buffer, now))
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Token expired and no refresh token available.
    #[error("Token expired and no refresh token available")]
    TokenExpiredNoRefresh,
    /// Failed to refresh token.
    #[error("Failed to refresh token: {message}")]
    RefreshFailed {
        /// Error description.
        message: String,
    },
    /// Token endpoint or provider rejected the request.
    #[error("Authorization failed: {message}")]
    AuthorizationFailed {
        /// Error description.
        message: String,
    },
    /// Configuration is incomplete or belongs to another protocol.
    #[error("Invalid authentication configuration: {message}")]
    InvalidConfiguration {
        /// Error description.
        message: String,
    },
    /// Callback state did not match the issued state.
    #[error("State mismatch on authorization callback")]
    StateMismatch,
    /// Network error.
    #[error("Network error: {message}")]
    NetworkError {
        /// Error description.
        message: String,
    },
}

impl AuthError {
    /// Shorthand for [`AuthError::InvalidConfiguration`].
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_expired_boundary() {
        let now = Utc::now();
        let expiry = now + Duration::seconds(60);
        assert!(!is_expired(expiry, Duration::seconds(59), now));
        assert!(is_expired(expiry, Duration::seconds(60), now));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = AccessToken::new("abc", "Bearer", Some(30), None, vec![], now);
        assert!(token.is_expired_or_expiring(Duration::seconds(60), now));
        assert!(!token.is_expired_or_expiring(Duration::seconds(10), now));
        assert_eq!(token.authorization_header(), "Bearer abc");
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let now = Utc::now();
        let token = AccessToken::new("abc", "bearer", None, None, vec![], now);
        assert!(!token.is_expired_or_expiring(Duration::days(365), now));
        assert!(!token.can_refresh());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials::header("Authorization", "Bearer top-secret");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("Authorization"));
    }
}
