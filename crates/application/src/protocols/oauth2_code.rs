//! `OAuth2` authorization code grant, with and without PKCE.
//!
//! The interactive part (sending the user to the authorization endpoint
//! and receiving the callback) happens outside the engine:
//! [`AuthorizationCodeStrategy::begin_authorization`] produces the URL and
//! the values to keep, [`AuthorizationCodeStrategy::complete_authorization`]
//! validates the callback and exchanges the code. A configuration that
//! already carries a code or a refresh token authenticates directly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tether_domain::{
    AccessToken, AuthError, AuthenticationConfig, ClientAuthMethod, Credentials, ErrorCode,
    ExecutionError, HandshakeExecutionResult, ProtocolType, RequestSpec, Secret,
};
use tracing::{debug, warn};

use super::oauth::{
    AuthorizationRequest, PkcePair, TokenRequest, authorization_url, generate_state,
    request_token, validate_state,
};
use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// Verifier length used when a flow generates its own.
const VERIFIER_LEN: usize = 64;

/// Values produced when an authorization starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSession {
    /// URL to open in a browser.
    pub url: String,
    /// Issued `state`, compared against the callback.
    pub state: String,
    /// PKCE verifier, kept until the code exchange.
    pub code_verifier: Option<Secret>,
}

/// The fields both variants share, borrowed from the configuration.
struct CodeFlow<'a> {
    authorization_url: &'a str,
    token_url: &'a str,
    client_id: &'a str,
    client_secret: Option<&'a Secret>,
    client_auth: ClientAuthMethod,
    redirect_uri: &'a str,
    scope: Option<&'a str>,
    code: Option<&'a Secret>,
    code_verifier: Option<&'a Secret>,
    refresh_token: Option<&'a Secret>,
    extra_params: &'a BTreeMap<String, String>,
    pkce: bool,
}

impl<'a> CodeFlow<'a> {
    fn from_config(config: &'a AuthenticationConfig, pkce: bool) -> Result<Self, AuthError> {
        let flow = match (config, pkce) {
            (
                AuthenticationConfig::OAuth2AuthorizationCode {
                    authorization_url,
                    token_url,
                    client_id,
                    client_secret,
                    redirect_uri,
                    scope,
                    code,
                    refresh_token,
                    client_auth,
                    extra_params,
                },
                false,
            ) => Self {
                authorization_url,
                token_url,
                client_id,
                client_secret: Some(client_secret),
                client_auth: *client_auth,
                redirect_uri,
                scope: scope.as_deref(),
                code: code.as_ref(),
                code_verifier: None,
                refresh_token: refresh_token.as_ref(),
                extra_params,
                pkce,
            },
            (
                AuthenticationConfig::OAuth2Pkce {
                    authorization_url,
                    token_url,
                    client_id,
                    client_secret,
                    redirect_uri,
                    scope,
                    code,
                    code_verifier,
                    refresh_token,
                    extra_params,
                },
                true,
            ) => Self {
                authorization_url,
                token_url,
                client_id,
                client_secret: client_secret.as_ref(),
                client_auth: ClientAuthMethod::RequestBody,
                redirect_uri,
                scope: scope.as_deref(),
                code: code.as_ref(),
                code_verifier: code_verifier.as_ref(),
                refresh_token: refresh_token.as_ref(),
                extra_params,
                pkce,
            },
            _ => {
                return Err(AuthError::invalid_config(if pkce {
                    "expected an oauth2_pkce configuration"
                } else {
                    "expected an oauth2_authorization_code configuration"
                }));
            }
        };
        if flow.token_url.is_empty() || flow.client_id.is_empty() {
            return Err(AuthError::invalid_config("token_url and client_id are required"));
        }
        Ok(flow)
    }

    fn token_request(&self, grant_type: &str) -> TokenRequest<'a> {
        TokenRequest::new(
            self.token_url,
            self.client_id,
            self.client_secret,
            self.client_auth,
            grant_type,
        )
    }

    fn exchange_request(&self, code: &str, verifier: Option<&str>) -> TokenRequest<'a> {
        self.token_request("authorization_code")
            .param("code", code)
            .param("redirect_uri", self.redirect_uri)
            .param_opt("code_verifier", verifier)
            .extend(self.extra_params)
    }

    fn refresh_request(&self, refresh_token: &str) -> TokenRequest<'a> {
        self.token_request("refresh_token")
            .param("refresh_token", refresh_token)
            .param_opt("scope", self.scope)
    }
}

/// Authorization code grant; `pkce` selects the RFC 7636 variant.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeStrategy {
    context: StrategyContext,
    pkce: bool,
}

/// The PKCE variant of the authorization code grant.
pub type PkceStrategy = AuthorizationCodeStrategy;

impl AuthorizationCodeStrategy {
    /// Creates the plain authorization code strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self {
            context,
            pkce: false,
        }
    }

    /// Creates the PKCE strategy.
    #[must_use]
    pub const fn pkce(context: StrategyContext) -> Self {
        Self {
            context,
            pkce: true,
        }
    }

    /// Builds the authorization URL with a fresh `state` (and PKCE challenge).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfiguration`] for a configuration of
    /// another protocol or an unparsable authorization URL.
    pub fn begin_authorization(
        &self,
        config: &AuthenticationConfig,
    ) -> Result<AuthorizationSession, AuthError> {
        let flow = CodeFlow::from_config(config, self.pkce)?;
        let state = generate_state();
        let pkce = if flow.pkce {
            Some(PkcePair::generate(VERIFIER_LEN)?)
        } else {
            None
        };

        let url = authorization_url(&AuthorizationRequest {
            authorization_url: flow.authorization_url,
            client_id: flow.client_id,
            redirect_uri: flow.redirect_uri,
            scope: flow.scope,
            state: &state,
            code_challenge: pkce.as_ref().map(|p| p.challenge.as_str()),
        })?;

        Ok(AuthorizationSession {
            url,
            state,
            code_verifier: pkce.map(|p| p.verifier),
        })
    }

    /// Validates the callback `state` and exchanges the code for a token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StateMismatch`] when the callback state differs
    /// from the issued one, and token endpoint errors otherwise.
    pub async fn complete_authorization(
        &self,
        config: &AuthenticationConfig,
        session: &AuthorizationSession,
        callback_state: &str,
        code: &str,
    ) -> Result<Credentials, AuthError> {
        validate_state(&session.state, callback_state)?;
        let flow = CodeFlow::from_config(config, self.pkce)?;
        let verifier = session.code_verifier.as_ref().map(Secret::expose);
        let token = request_token(&self.context, &flow.exchange_request(code, verifier)).await?;
        self.store(config, &token).await;
        Ok(token.to_credentials())
    }

    async fn store(&self, config: &AuthenticationConfig, token: &AccessToken) {
        if let Some(key) = config.cache_key() {
            self.context.tokens.store(key, token.clone()).await;
        }
    }

    async fn refresh(&self, flow: &CodeFlow<'_>, refresh_token: &str) -> Result<AccessToken, AuthError> {
        request_token(&self.context, &flow.refresh_request(refresh_token))
            .await
            .map_err(|err| AuthError::RefreshFailed {
                message: err.to_string(),
            })
    }

    async fn token(&self, config: &AuthenticationConfig) -> Result<AccessToken, AuthError> {
        let flow = CodeFlow::from_config(config, self.pkce)?;
        let key = config.cache_key().unwrap_or_default();
        let now = self.context.clock.now();

        if let Some(token) = self.context.tokens.get_valid(&key, now).await {
            debug!(client_id = %flow.client_id, "using cached token");
            return Ok(token);
        }

        let token = if let Some(stale) = self.context.tokens.refreshable(&key, now).await {
            let refresh = stale.refresh_token.as_ref().map(Secret::expose).unwrap_or_default();
            let mut token = self.refresh(&flow, refresh).await?;
            if token.refresh_token.is_none() {
                token.refresh_token = stale.refresh_token;
            }
            token
        } else if let Some(refresh_token) = flow.refresh_token {
            self.refresh(&flow, refresh_token.expose()).await?
        } else if let Some(code) = flow.code {
            if flow.pkce && flow.code_verifier.is_none() {
                return Err(AuthError::invalid_config(
                    "a code_verifier is required to exchange a PKCE code",
                ));
            }
            let verifier = flow.code_verifier.map(Secret::expose);
            request_token(&self.context, &flow.exchange_request(code.expose(), verifier)).await?
        } else {
            let session = self.begin_authorization(config)?;
            return Err(AuthError::AuthorizationFailed {
                message: format!("user authorization required: {}", session.url),
            });
        };

        self.store(config, &token).await;
        Ok(token)
    }
}

#[async_trait]
impl ProtocolStrategy for AuthorizationCodeStrategy {
    fn protocol_type(&self) -> ProtocolType {
        if self.pkce {
            ProtocolType::OAuth2Pkce
        } else {
            ProtocolType::OAuth2AuthorizationCode
        }
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        match self.token(config).await {
            Ok(token) => AuthOutcome::authenticated(token.to_credentials()),
            Err(err) => {
                warn!(protocol = %self.protocol_type(), error = %err, "authorization code authentication failed");
                AuthOutcome::failed(err)
            }
        }
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let now = self.context.clock.now();
        if credentials.is_expired(self.context.tokens.safety_buffer(), now) {
            return match self.token(config).await {
                Ok(token) => {
                    support::send_spec(&self.context, request, &token.to_credentials(), options).await
                }
                Err(err) => HandshakeExecutionResult::failure(
                    &request.name,
                    ExecutionError::new(ErrorCode::AuthError, err.to_string()),
                ),
            };
        }
        support::send_spec(&self.context, request, credentials, options).await
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        CodeFlow::from_config(config, self.pkce).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::context;
    use pretty_assertions::assert_eq;

    fn code_config(code: Option<&str>) -> AuthenticationConfig {
        AuthenticationConfig::OAuth2AuthorizationCode {
            authorization_url: "https://auth.io/authorize".to_string(),
            token_url: "https://auth.io/token".to_string(),
            client_id: "app".to_string(),
            client_secret: Secret::new("pw"),
            redirect_uri: "http://localhost/cb".to_string(),
            scope: Some("read".to_string()),
            code: code.map(Secret::new),
            refresh_token: None,
            client_auth: ClientAuthMethod::BasicHeader,
            extra_params: BTreeMap::new(),
        }
    }

    fn pkce_config() -> AuthenticationConfig {
        AuthenticationConfig::OAuth2Pkce {
            authorization_url: "https://auth.io/authorize".to_string(),
            token_url: "https://auth.io/token".to_string(),
            client_id: "app".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost/cb".to_string(),
            scope: None,
            code: None,
            code_verifier: None,
            refresh_token: None,
            extra_params: BTreeMap::new(),
        }
    }

    fn token_reply(body: &str) -> Result<TransportResponse, crate::ports::TransportError> {
        Ok(TransportResponse::new(200, body))
    }

    #[tokio::test]
    async fn test_exchanges_configured_code() {
        let transport = ScriptedTransport::new().then(token_reply(
            r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,"refresh_token":"rt"}"#,
        ));
        let (ctx, _) = context(&transport);
        let strategy = AuthorizationCodeStrategy::new(ctx);

        let outcome = strategy.authenticate(&code_config(Some("c0de"))).await;
        assert!(outcome.success);

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("Authorization"), Some("Basic YXBwOnB3"));
        assert_eq!(
            sent.body.as_deref(),
            Some("grant_type=authorization_code&code=c0de&redirect_uri=http%3A%2F%2Flocalhost%2Fcb")
        );
    }

    #[tokio::test]
    async fn test_without_code_asks_for_authorization() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let outcome = AuthorizationCodeStrategy::new(ctx)
            .authenticate(&code_config(None))
            .await;
        let Some(AuthError::AuthorizationFailed { message }) = outcome.error else {
            panic!("expected authorization failure");
        };
        assert!(message.contains("https://auth.io/authorize?response_type=code"));
    }

    #[tokio::test]
    async fn test_stale_cached_token_is_refreshed() {
        let transport = ScriptedTransport::new()
            .then(token_reply(
                r#"{"access_token":"a1","token_type":"Bearer","expires_in":100,"refresh_token":"rt"}"#,
            ))
            .then(token_reply(r#"{"access_token":"a2","token_type":"Bearer","expires_in":3600}"#));
        let (ctx, clock) = context(&transport);
        let strategy = AuthorizationCodeStrategy::new(ctx.clone());
        let config = code_config(Some("c0de"));

        strategy.authenticate(&config).await;
        clock.advance(chrono::Duration::seconds(50));
        let outcome = strategy.authenticate(&config).await;

        assert!(outcome.success);
        let refresh = &transport.requests()[1];
        assert!(refresh.body.as_deref().unwrap().starts_with("grant_type=refresh_token&refresh_token=rt"));
        let cached = ctx.tokens.get(&config.cache_key().unwrap()).await.unwrap();
        assert_eq!(cached.refresh_token, Some(Secret::new("rt")));
    }

    #[tokio::test]
    async fn test_pkce_session_round_trip() {
        let transport = ScriptedTransport::new()
            .then(token_reply(r#"{"access_token":"at","token_type":"Bearer"}"#));
        let (ctx, _) = context(&transport);
        let strategy = AuthorizationCodeStrategy::pkce(ctx);
        let config = pkce_config();

        let session = strategy.begin_authorization(&config).unwrap();
        let verifier = session.code_verifier.clone().unwrap();
        assert_eq!(verifier.expose().len(), 64);
        assert!(session.url.contains("code_challenge_method=S256"));
        assert!(session.url.contains(&format!(
            "code_challenge={}",
            crate::protocols::oauth::code_challenge(verifier.expose())
        )));

        let mismatch = strategy
            .complete_authorization(&config, &session, "forged", "code")
            .await;
        assert_eq!(mismatch, Err(AuthError::StateMismatch));
        assert_eq!(transport.call_count(), 0);

        let credentials = strategy
            .complete_authorization(&config, &session, &session.state, "code")
            .await
            .unwrap();
        assert_eq!(
            credentials.material,
            tether_domain::CredentialMaterial::Header {
                name: "Authorization".to_string(),
                value: Secret::new("Bearer at"),
            }
        );
        let body = transport.requests()[0].body.clone().unwrap();
        let encoded: String =
            url::form_urlencoded::byte_serialize(verifier.expose().as_bytes()).collect();
        assert!(body.contains(&format!("code_verifier={encoded}")));
        assert!(body.ends_with("client_id=app"));
    }

    #[tokio::test]
    async fn test_pkce_code_without_verifier_is_rejected() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let mut config = pkce_config();
        if let AuthenticationConfig::OAuth2Pkce { code, .. } = &mut config {
            *code = Some(Secret::new("c"));
        }
        let outcome = AuthorizationCodeStrategy::pkce(ctx).authenticate(&config).await;
        assert!(matches!(outcome.error, Some(AuthError::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn test_variant_mismatch_is_invalid() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let strategy = AuthorizationCodeStrategy::pkce(ctx);
        assert!(!strategy.health_check(&code_config(None)).await);
        assert!(strategy.health_check(&pkce_config()).await);
    }
}
