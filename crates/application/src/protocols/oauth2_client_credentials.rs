//! `OAuth2` client credentials grant.

use async_trait::async_trait;
use tether_domain::{
    AccessToken, AuthError, AuthenticationConfig, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, ProtocolType, RequestSpec,
};
use tracing::{debug, warn};

use super::oauth::{TokenRequest, request_token};
use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// Machine-to-machine token flow with a shared token cache.
#[derive(Debug, Clone)]
pub struct ClientCredentialsStrategy {
    context: StrategyContext,
}

impl ClientCredentialsStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    /// Returns a cached token that is outside the safety buffer, or fetches one.
    async fn token(&self, config: &AuthenticationConfig) -> Result<AccessToken, AuthError> {
        let AuthenticationConfig::OAuth2ClientCredentials {
            token_url,
            client_id,
            client_secret,
            scope,
            audience,
            client_auth,
            extra_params,
        } = config
        else {
            return Err(AuthError::invalid_config(
                "expected an oauth2_client_credentials configuration",
            ));
        };
        if token_url.is_empty() || client_id.is_empty() {
            return Err(AuthError::invalid_config("token_url and client_id are required"));
        }

        let key = config.cache_key().unwrap_or_default();
        let now = self.context.clock.now();
        if let Some(token) = self.context.tokens.get_valid(&key, now).await {
            debug!(client_id = %client_id, "using cached token");
            return Ok(token);
        }

        let request = TokenRequest::new(
            token_url,
            client_id,
            Some(client_secret),
            *client_auth,
            "client_credentials",
        )
        .param_opt("scope", scope.as_deref())
        .param_opt("audience", audience.as_deref())
        .extend(extra_params);

        let token = request_token(&self.context, &request).await?;
        self.context.tokens.store(key, token.clone()).await;
        Ok(token)
    }
}

#[async_trait]
impl ProtocolStrategy for ClientCredentialsStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::OAuth2ClientCredentials
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        match self.token(config).await {
            Ok(token) => AuthOutcome::authenticated(token.to_credentials()),
            Err(err) => {
                warn!(error = %err, "client credentials authentication failed");
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
            debug!("token expiring, fetching a fresh one");
            match self.token(config).await {
                Ok(token) => {
                    return support::send_spec(&self.context, request, &token.to_credentials(), options)
                        .await;
                }
                Err(err) => {
                    return HandshakeExecutionResult::failure(
                        &request.name,
                        ExecutionError::new(ErrorCode::AuthError, err.to_string()),
                    );
                }
            }
        }
        support::send_spec(&self.context, request, credentials, options).await
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        matches!(
            config,
            AuthenticationConfig::OAuth2ClientCredentials { token_url, client_id, .. }
                if !token_url.is_empty() && !client_id.is_empty()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tether_domain::{ClientAuthMethod, Secret};

    fn config() -> AuthenticationConfig {
        AuthenticationConfig::OAuth2ClientCredentials {
            token_url: "https://auth.io/token".to_string(),
            client_id: "svc".to_string(),
            client_secret: Secret::new("pw"),
            scope: Some("read".to_string()),
            audience: None,
            client_auth: ClientAuthMethod::RequestBody,
            extra_params: BTreeMap::new(),
        }
    }

    fn token_reply(expires_in: u64) -> Result<TransportResponse, crate::ports::TransportError> {
        Ok(TransportResponse::new(
            200,
            format!(r#"{{"access_token":"at-{expires_in}","token_type":"Bearer","expires_in":{expires_in}}}"#),
        ))
    }

    #[tokio::test]
    async fn test_fetches_then_reuses_cached_token() {
        let transport = ScriptedTransport::new().then(token_reply(3600));
        let (ctx, _) = context(&transport);
        let strategy = ClientCredentialsStrategy::new(ctx);

        let first = strategy.authenticate(&config()).await;
        let second = strategy.authenticate(&config()).await;
        assert!(first.success && second.success);
        assert_eq!(first.credentials, second.credentials);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(
            transport.requests()[0].body.as_deref(),
            Some("grant_type=client_credentials&scope=read&client_id=svc&client_secret=pw")
        );
    }

    #[tokio::test]
    async fn test_different_secret_is_not_served_from_cache() {
        let transport = ScriptedTransport::new()
            .then(token_reply(3600))
            .then(Ok(TransportResponse::new(401, r#"{"error":"invalid_client"}"#)));
        let (ctx, _) = context(&transport);
        let strategy = ClientCredentialsStrategy::new(ctx);

        let mut wrong = config();
        if let AuthenticationConfig::OAuth2ClientCredentials { client_secret, .. } = &mut wrong {
            *client_secret = Secret::new("WRONG");
        }

        assert!(strategy.authenticate(&config()).await.success);
        assert!(!strategy.authenticate(&wrong).await.success);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_token_inside_safety_buffer_is_refetched() {
        let transport = ScriptedTransport::new()
            .then(token_reply(120))
            .then(token_reply(3600));
        let (ctx, clock) = context(&transport);
        let strategy = ClientCredentialsStrategy::new(ctx);

        strategy.authenticate(&config()).await;
        clock.advance(chrono::Duration::seconds(61));
        let outcome = strategy.authenticate(&config()).await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            outcome.credentials.unwrap().material,
            tether_domain::CredentialMaterial::Header {
                name: "Authorization".to_string(),
                value: Secret::new("Bearer at-3600"),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_refreshes_expired_credentials() {
        let transport = ScriptedTransport::new()
            .then(token_reply(30))
            .then(token_reply(3600))
            .then(Ok(TransportResponse::new(200, "{}")));
        let (ctx, _) = context(&transport);
        let strategy = ClientCredentialsStrategy::new(ctx);

        let credentials = strategy.authenticate(&config()).await.credentials.unwrap();
        let result = strategy
            .execute_request(&spec("curl https://api.io/x"), &config(), &credentials, &ExecOptions::default())
            .await;

        assert!(result.success);
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].header("Authorization"), Some("Bearer at-3600"));
    }

    #[tokio::test]
    async fn test_endpoint_rejection_fails_authentication() {
        let transport = ScriptedTransport::new()
            .then(Ok(TransportResponse::new(401, r#"{"error":"invalid_client"}"#)));
        let (ctx, _) = context(&transport);
        let outcome = ClientCredentialsStrategy::new(ctx).authenticate(&config()).await;
        assert_eq!(
            outcome.error,
            Some(AuthError::AuthorizationFailed {
                message: "invalid_client".to_string()
            })
        );
    }
}
