//! `OAuth2` helpers: token endpoint exchanges, PKCE and state handling.

use std::time::Duration;

use serde::Deserialize;
use tether_domain::{AccessToken, AuthError, ClientAuthMethod, HttpMethod, Secret};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::StrategyContext;
use crate::crypto;
use crate::ports::TransportRequest;
use crate::sanitizer::sanitize_string;

/// Content-Type for form-urlencoded data.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shortest verifier RFC 7636 allows.
pub const MIN_VERIFIER_LEN: usize = 43;

/// Longest verifier RFC 7636 allows.
pub const MAX_VERIFIER_LEN: usize = 128;

/// Challenge method sent with PKCE authorization requests.
pub const CHALLENGE_METHOD: &str = "S256";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// `OAuth2` token response from token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// `OAuth2` error response.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Grant-specific parameters sent to a token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    /// Token endpoint URL.
    pub token_url: &'a str,
    /// Client identifier.
    pub client_id: &'a str,
    /// Client secret; public clients have none.
    pub client_secret: Option<&'a Secret>,
    /// How the client credentials are sent.
    pub client_auth: ClientAuthMethod,
    /// Grant parameters (`grant_type`, `code`, ...).
    pub params: Vec<(String, String)>,
}

impl<'a> TokenRequest<'a> {
    /// Creates a request for the given grant type.
    #[must_use]
    pub fn new(
        token_url: &'a str,
        client_id: &'a str,
        client_secret: Option<&'a Secret>,
        client_auth: ClientAuthMethod,
        grant_type: &str,
    ) -> Self {
        Self {
            token_url,
            client_id,
            client_secret,
            client_auth,
            params: vec![("grant_type".to_string(), grant_type.to_string())],
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    /// Adds a parameter when a value is present.
    #[must_use]
    pub fn param_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) if !value.is_empty() => self.param(name, value),
            _ => self,
        }
    }

    /// Adds every extra parameter.
    #[must_use]
    pub fn extend<'b>(mut self, extra: impl IntoIterator<Item = (&'b String, &'b String)>) -> Self {
        self.params
            .extend(extra.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Returns the form body and the headers for this request.
    fn encode(&self) -> Result<(String, Vec<(String, String)>), AuthError> {
        let mut params = self.params.clone();
        let mut headers = vec![
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];

        match (self.client_secret, self.client_auth) {
            (Some(secret), ClientAuthMethod::BasicHeader) => {
                headers.push((
                    "Authorization".to_string(),
                    basic_client_auth(self.client_id, secret.expose()),
                ));
            }
            (Some(secret), ClientAuthMethod::RequestBody) => {
                params.push(("client_id".to_string(), self.client_id.to_string()));
                params.push(("client_secret".to_string(), secret.expose().to_string()));
            }
            (None, _) => params.push(("client_id".to_string(), self.client_id.to_string())),
        }

        let body = serde_urlencoded::to_string(&params).map_err(|e| AuthError::NetworkError {
            message: format!("Failed to encode form: {e}"),
        })?;
        Ok((body, headers))
    }
}

/// `Basic` client authentication per RFC 6749 §2.3.1 (form-encoded id and secret).
fn basic_client_auth(client_id: &str, client_secret: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    let pair = format!("{}:{}", encode(client_id), encode(client_secret));
    format!("Basic {}", crypto::base64_encode(pair.as_bytes()))
}

/// Posts a token request and parses the issued token.
///
/// # Errors
///
/// Returns [`AuthError::NetworkError`] when the endpoint cannot be reached or
/// answers with something that is not a token, and
/// [`AuthError::AuthorizationFailed`] when it rejects the request.
pub async fn request_token(
    context: &StrategyContext,
    request: &TokenRequest<'_>,
) -> Result<AccessToken, AuthError> {
    let (body, headers) = request.encode()?;
    let transport_request = TransportRequest {
        method: HttpMethod::Post,
        url: request.token_url.to_string(),
        headers,
        body: Some(body),
        timeout: TOKEN_TIMEOUT,
        follow_redirects: false,
        insecure: false,
        abort: CancellationToken::new(),
    };

    debug!(url = %sanitize_string(request.token_url), "requesting token");
    let response = context
        .transport
        .send(transport_request)
        .await
        .map_err(|e| AuthError::NetworkError {
            message: e.to_string(),
        })?;

    if !(200..300).contains(&response.status) {
        warn!(status = response.status, "token endpoint rejected request");
        if let Ok(error_response) = serde_json::from_str::<TokenErrorResponse>(&response.body) {
            return Err(AuthError::AuthorizationFailed {
                message: error_response
                    .error_description
                    .unwrap_or(error_response.error),
            });
        }
        return Err(AuthError::AuthorizationFailed {
            message: format!("Token request failed with status {}", response.status),
        });
    }

    let token_response: TokenResponse =
        serde_json::from_str(&response.body).map_err(|e| AuthError::NetworkError {
            message: format!("Failed to parse token response: {e}"),
        })?;

    let scopes = token_response
        .scope
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    Ok(AccessToken::new(
        token_response.access_token,
        token_response.token_type,
        token_response.expires_in,
        token_response.refresh_token.map(Secret::new),
        scopes,
        context.clock.now(),
    ))
}

/// A PKCE verifier with its derived challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// The secret verifier, sent with the token request.
    pub verifier: Secret,
    /// `base64url(SHA-256(verifier))`, sent with the authorization request.
    pub challenge: String,
    /// Always `S256`.
    pub method: &'static str,
}

impl PkcePair {
    /// Generates a verifier of the given length and its challenge.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] for lengths outside 43..=128.
    pub fn generate(len: usize) -> Result<Self, AuthError> {
        let verifier = generate_code_verifier(len)?;
        Ok(Self::from_verifier(verifier))
    }

    /// Derives the pair for an existing verifier.
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        Self {
            challenge: code_challenge(&verifier),
            verifier: Secret::new(verifier),
            method: CHALLENGE_METHOD,
        }
    }
}

/// Generates a code verifier from the RFC 7636 unreserved character set.
///
/// # Errors
///
/// Returns [`AuthError::InvalidConfiguration`] for lengths outside 43..=128.
pub fn generate_code_verifier(len: usize) -> Result<String, AuthError> {
    if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len) {
        return Err(AuthError::invalid_config(format!(
            "code verifier length must be between {MIN_VERIFIER_LEN} and {MAX_VERIFIER_LEN}, got {len}"
        )));
    }
    crypto::random_string(len, crypto::PKCE_UNRESERVED)
        .map_err(|e| AuthError::invalid_config(e.to_string()))
}

/// Derives the `S256` challenge for a verifier.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    crypto::base64url_encode(&crypto::sha256(verifier.as_bytes()))
}

/// Generates a random `state` value (32 random bytes, base64url).
#[must_use]
pub fn generate_state() -> String {
    crypto::base64url_encode(&crypto::random_bytes(32))
}

/// Checks a callback `state` against the issued one in constant time.
///
/// # Errors
///
/// Returns [`AuthError::StateMismatch`] unless the values are byte-identical.
pub fn validate_state(expected: &str, received: &str) -> Result<(), AuthError> {
    if crypto::constant_time_eq(expected.as_bytes(), received.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::StateMismatch)
    }
}

/// Parameters of an authorization request.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    /// Authorization endpoint URL.
    pub authorization_url: &'a str,
    /// Client identifier.
    pub client_id: &'a str,
    /// Redirect URI registered for the client.
    pub redirect_uri: &'a str,
    /// Space-separated scopes.
    pub scope: Option<&'a str>,
    /// Random `state` value.
    pub state: &'a str,
    /// PKCE challenge, if any.
    pub code_challenge: Option<&'a str>,
}

/// Builds the URL the user visits to grant access.
///
/// # Errors
///
/// Returns [`AuthError::InvalidConfiguration`] when the endpoint is not a URL.
pub fn authorization_url(request: &AuthorizationRequest<'_>) -> Result<String, AuthError> {
    let mut url = url::Url::parse(request.authorization_url)
        .map_err(|e| AuthError::invalid_config(format!("invalid authorization URL: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", request.client_id)
            .append_pair("redirect_uri", request.redirect_uri)
            .append_pair("state", request.state);
        if let Some(scope) = request.scope.filter(|s| !s.is_empty()) {
            query.append_pair("scope", scope);
        }
        if let Some(challenge) = request.code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", CHALLENGE_METHOD);
        }
    }
    Ok(url.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{Clock, ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rfc7636_challenge() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verifier_length_and_charset() {
        for len in [43, 64, 128] {
            let verifier = generate_code_verifier(len).unwrap();
            assert_eq!(verifier.len(), len);
            assert!(verifier.bytes().all(|b| crypto::PKCE_UNRESERVED.contains(&b)));
        }
        assert!(generate_code_verifier(42).is_err());
        assert!(generate_code_verifier(129).is_err());
    }

    #[test]
    fn test_pkce_pair_is_deterministic_for_verifier() {
        let a = PkcePair::from_verifier("v".repeat(43));
        let b = PkcePair::from_verifier("v".repeat(43));
        assert_eq!(a.challenge, b.challenge);
        assert_eq!(a.method, "S256");
    }

    #[test]
    fn test_state_validation_is_exact() {
        let state = generate_state();
        assert!(validate_state(&state, &state).is_ok());
        assert_eq!(validate_state(&state, &state[1..]), Err(AuthError::StateMismatch));
        assert_eq!(validate_state("abc", "abd"), Err(AuthError::StateMismatch));
        assert_ne!(generate_state(), state);
    }

    #[test]
    fn test_authorization_url() {
        let url = authorization_url(&AuthorizationRequest {
            authorization_url: "https://auth.io/authorize",
            client_id: "app",
            redirect_uri: "http://localhost/cb",
            scope: Some("read write"),
            state: "xyz",
            code_challenge: Some("abc"),
        })
        .unwrap();
        assert_eq!(
            url,
            "https://auth.io/authorize?response_type=code&client_id=app&redirect_uri=http%3A%2F%2Flocalhost%2Fcb&state=xyz&scope=read+write&code_challenge=abc&code_challenge_method=S256"
        );
    }

    #[tokio::test]
    async fn test_request_token_with_basic_client_auth() {
        let transport = ScriptedTransport::new().then(Ok(TransportResponse::new(
            200,
            r#"{"access_token":"at","token_type":"bearer","expires_in":3600,"scope":"a b"}"#,
        )));
        let (ctx, clock) = context(&transport);
        let secret = Secret::new("s3cret");
        let request = TokenRequest::new(
            "https://auth.io/token",
            "app",
            Some(&secret),
            ClientAuthMethod::BasicHeader,
            "client_credentials",
        );

        let token = request_token(&ctx, &request).await.unwrap();
        assert_eq!(token.access_token.expose(), "at");
        assert_eq!(token.scopes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            token.expires_at,
            Some(clock.now() + chrono::Duration::seconds(3600))
        );

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("Authorization"), Some("Basic YXBwOnMzY3JldA=="));
        assert_eq!(sent.body.as_deref(), Some("grant_type=client_credentials"));
    }

    #[tokio::test]
    async fn test_request_token_body_auth_and_error() {
        let transport = ScriptedTransport::new().then(Ok(TransportResponse::new(
            400,
            r#"{"error":"invalid_client","error_description":"bad secret"}"#,
        )));
        let (ctx, _) = context(&transport);
        let secret = Secret::new("s");
        let request = TokenRequest::new(
            "https://auth.io/token",
            "app",
            Some(&secret),
            ClientAuthMethod::RequestBody,
            "client_credentials",
        )
        .param_opt("scope", Some("read"));

        let err = request_token(&ctx, &request).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::AuthorizationFailed {
                message: "bad secret".to_string()
            }
        );
        let sent = &transport.requests()[0];
        assert_eq!(sent.header("Authorization"), None);
        assert_eq!(
            sent.body.as_deref(),
            Some("grant_type=client_credentials&scope=read&client_id=app&client_secret=s")
        );
    }
}
