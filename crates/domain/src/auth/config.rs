//! Authentication configuration types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::secret::Secret;

/// Closed set of supported protocol types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// Plain cURL command, no separate auth step.
    Curl,
    /// `OAuth2` Authorization Code flow.
    #[serde(rename = "oauth2_authorization_code")]
    OAuth2AuthorizationCode,
    /// `OAuth2` Authorization Code flow with PKCE.
    #[serde(rename = "oauth2_pkce")]
    OAuth2Pkce,
    /// `OAuth2` Client Credentials flow.
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials,
    /// Static API key in a header or query parameter.
    ApiKey,
    /// HTTP Basic authentication.
    Basic,
    /// GraphQL over HTTP.
    #[serde(rename = "graphql")]
    GraphQl,
    /// WebSocket message exchange.
    #[serde(rename = "websocket")]
    WebSocket,
    /// SOAP/XML envelopes.
    Soap,
    /// Requests against a source repository host.
    RepoRunner,
    /// Unauthenticated scraping of public pages.
    KeylessScraper,
}

impl ProtocolType {
    /// Returns every protocol type in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Curl,
            Self::OAuth2AuthorizationCode,
            Self::OAuth2Pkce,
            Self::OAuth2ClientCredentials,
            Self::ApiKey,
            Self::Basic,
            Self::GraphQl,
            Self::WebSocket,
            Self::Soap,
            Self::RepoRunner,
            Self::KeylessScraper,
        ]
    }

    /// Returns the wire identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::OAuth2AuthorizationCode => "oauth2_authorization_code",
            Self::OAuth2Pkce => "oauth2_pkce",
            Self::OAuth2ClientCredentials => "oauth2_client_credentials",
            Self::ApiKey => "api_key",
            Self::Basic => "basic",
            Self::GraphQl => "graphql",
            Self::WebSocket => "websocket",
            Self::Soap => "soap",
            Self::RepoRunner => "repo_runner",
            Self::KeylessScraper => "keyless_scraper",
        }
    }

    /// Returns true for protocols that obtain tokens from a token endpoint.
    #[must_use]
    pub const fn is_token_based(self) -> bool {
        matches!(
            self,
            Self::OAuth2AuthorizationCode | Self::OAuth2Pkce | Self::OAuth2ClientCredentials
        )
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| DomainError::UnknownProtocol(s.to_string()))
    }
}

/// How OAuth client credentials are sent to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// `Authorization: Basic base64(client_id:client_secret)`
    #[default]
    BasicHeader,
    /// `client_id` and `client_secret` form fields.
    RequestBody,
}

/// Location for API key authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    /// Add to request headers
    #[default]
    Header,
    /// Add to query parameters
    Query,
}

/// SOAP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (`text/xml` + `SOAPAction` header)
    #[default]
    #[serde(rename = "1.1")]
    V11,
    /// SOAP 1.2 (`application/soap+xml; action=...`)
    #[serde(rename = "1.2")]
    V12,
}

/// Authentication configuration, one variant per protocol type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    /// Plain cURL command.
    #[default]
    Curl,
    /// `OAuth2` Authorization Code flow
    #[serde(rename = "oauth2_authorization_code")]
    OAuth2AuthorizationCode {
        /// Authorization endpoint URL
        authorization_url: String,
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: Secret,
        /// Redirect URI for the callback
        redirect_uri: String,
        /// Space-separated scopes
        #[serde(default)]
        scope: Option<String>,
        /// Authorization code received on the callback
        #[serde(default)]
        code: Option<Secret>,
        /// Refresh token from an earlier exchange
        #[serde(default)]
        refresh_token: Option<Secret>,
        /// How client credentials reach the token endpoint
        #[serde(default)]
        client_auth: ClientAuthMethod,
        /// Additional token request parameters
        #[serde(default)]
        extra_params: BTreeMap<String, String>,
    },
    /// `OAuth2` Authorization Code flow with PKCE
    #[serde(rename = "oauth2_pkce")]
    OAuth2Pkce {
        /// Authorization endpoint URL
        authorization_url: String,
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret, absent for public clients
        #[serde(default)]
        client_secret: Option<Secret>,
        /// Redirect URI for the callback
        redirect_uri: String,
        /// Space-separated scopes
        #[serde(default)]
        scope: Option<String>,
        /// Authorization code received on the callback
        #[serde(default)]
        code: Option<Secret>,
        /// Verifier generated when the authorization URL was built
        #[serde(default)]
        code_verifier: Option<Secret>,
        /// Refresh token from an earlier exchange
        #[serde(default)]
        refresh_token: Option<Secret>,
        /// Additional token request parameters
        #[serde(default)]
        extra_params: BTreeMap<String, String>,
    },
    /// `OAuth2` Client Credentials flow
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: Secret,
        /// Space-separated scopes
        #[serde(default)]
        scope: Option<String>,
        /// Token audience, for providers that require one
        #[serde(default)]
        audience: Option<String>,
        /// How client credentials reach the token endpoint
        #[serde(default)]
        client_auth: ClientAuthMethod,
        /// Additional token request parameters
        #[serde(default)]
        extra_params: BTreeMap<String, String>,
    },
    /// API Key authentication
    ApiKey {
        /// The API key value
        key: Secret,
        /// Header or query parameter name
        name: String,
        /// Where to add the key
        #[serde(default)]
        location: ApiKeyLocation,
        /// Optional value prefix (e.g. `Token`)
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: Secret,
    },
    /// GraphQL endpoint
    #[serde(rename = "graphql")]
    GraphQl {
        /// GraphQL endpoint URL, used when a request has no URL of its own
        endpoint: String,
        /// Bearer token sent with every query
        #[serde(default)]
        bearer_token: Option<Secret>,
        /// Static headers sent with every query
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// WebSocket endpoint
    #[serde(rename = "websocket")]
    WebSocket {
        /// `ws://` or `wss://` URL
        url: String,
        /// Handshake headers
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Subprotocols to request
        #[serde(default)]
        subprotocols: Vec<String>,
        /// Bearer token sent in the handshake
        #[serde(default)]
        bearer_token: Option<Secret>,
    },
    /// SOAP service
    Soap {
        /// Service endpoint URL
        endpoint: String,
        /// SOAP version
        #[serde(default)]
        version: SoapVersion,
        /// WS-Security username
        #[serde(default)]
        username: Option<String>,
        /// WS-Security password
        #[serde(default)]
        password: Option<Secret>,
        /// Extra namespace declarations (prefix -> URI)
        #[serde(default)]
        namespaces: BTreeMap<String, String>,
    },
    /// Source repository host
    RepoRunner {
        /// `owner/name`
        repository: String,
        /// Branch, tag or commit
        #[serde(default = "default_git_ref")]
        git_ref: String,
        /// Base URL for raw file content
        #[serde(default = "default_raw_base_url")]
        raw_base_url: String,
        /// Base URL of the host's REST API
        #[serde(default = "default_api_base_url")]
        api_base_url: String,
        /// Access token
        #[serde(default)]
        token: Option<Secret>,
    },
    /// Unauthenticated scraping
    KeylessScraper {
        /// User agent override
        #[serde(default)]
        user_agent: Option<String>,
        /// Regex whose captures are extracted into the typed body
        #[serde(default)]
        extract_pattern: Option<String>,
    },
}

fn default_git_ref() -> String {
    "main".to_string()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

impl AuthenticationConfig {
    /// Returns the protocol type this configuration belongs to.
    #[must_use]
    pub const fn protocol_type(&self) -> ProtocolType {
        match self {
            Self::Curl => ProtocolType::Curl,
            Self::OAuth2AuthorizationCode { .. } => ProtocolType::OAuth2AuthorizationCode,
            Self::OAuth2Pkce { .. } => ProtocolType::OAuth2Pkce,
            Self::OAuth2ClientCredentials { .. } => ProtocolType::OAuth2ClientCredentials,
            Self::ApiKey { .. } => ProtocolType::ApiKey,
            Self::Basic { .. } => ProtocolType::Basic,
            Self::GraphQl { .. } => ProtocolType::GraphQl,
            Self::WebSocket { .. } => ProtocolType::WebSocket,
            Self::Soap { .. } => ProtocolType::Soap,
            Self::RepoRunner { .. } => ProtocolType::RepoRunner,
            Self::KeylessScraper { .. } => ProtocolType::KeylessScraper,
        }
    }

    /// Creates a bearer-less API key in a header.
    #[must_use]
    pub fn api_key_header(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ApiKey {
            key: Secret::new(key),
            name: name.into(),
            location: ApiKeyLocation::Header,
            prefix: None,
        }
    }

    /// Creates a basic authentication.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: Secret::new(password),
        }
    }

    /// Generates a unique key for token caching.
    ///
    /// The key is the protocol name plus a SHA-256 digest of the whole
    /// configuration, so any field that changes the issued token (secret,
    /// client auth method, extra parameters) also changes the key. Secrets
    /// never appear in the key itself.
    #[must_use]
    pub fn cache_key(&self) -> Option<String> {
        const HEX: &[u8; 16] = b"0123456789abcdef";

        let protocol = self.protocol_type();
        if !protocol.is_token_based() {
            return None;
        }
        let material = serde_json::to_vec(self).ok()?;
        let digest = Sha256::digest(&material);
        let mut key = String::with_capacity(protocol.as_str().len() + 1 + digest.len() * 2);
        key.push_str(protocol.as_str());
        key.push(':');
        for byte in digest {
            key.push(char::from(HEX[usize::from(byte >> 4)]));
            key.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
        Some(key)
    }
}
