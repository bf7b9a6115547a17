//! API key authentication.

use async_trait::async_trait;
use tether_domain::{
    ApiKeyLocation, AuthError, AuthenticationConfig, Credentials, HandshakeExecutionResult,
    ProtocolType, RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// Injects a static key into a header or query parameter.
#[derive(Debug, Clone)]
pub struct ApiKeyStrategy {
    context: StrategyContext,
}

impl ApiKeyStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn credentials(config: &AuthenticationConfig) -> Result<Credentials, AuthError> {
        let AuthenticationConfig::ApiKey {
            key,
            name,
            location,
            prefix,
        } = config
        else {
            return Err(AuthError::invalid_config("expected an api_key configuration"));
        };
        if key.is_empty() || name.trim().is_empty() {
            return Err(AuthError::invalid_config("API key name and value are required"));
        }

        Ok(match location {
            ApiKeyLocation::Header => {
                let value = match prefix.as_deref().filter(|p| !p.is_empty()) {
                    Some(prefix) => format!("{prefix} {}", key.expose()),
                    None => key.expose().to_string(),
                };
                Credentials::header(name.clone(), value)
            }
            ApiKeyLocation::Query => Credentials::query_param(name.clone(), key.clone()),
        })
    }
}

#[async_trait]
impl ProtocolStrategy for ApiKeyStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::ApiKey
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        Self::credentials(config).into()
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        _config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        support::send_spec(&self.context, request, credentials, options).await
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        Self::credentials(config).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::ScriptedTransport;
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;
    use tether_domain::Secret;

    async fn send_with(config: AuthenticationConfig) -> crate::ports::TransportRequest {
        let transport = ScriptedTransport::new();
        let (ctx, _) = context(&transport);
        let strategy = ApiKeyStrategy::new(ctx);
        let credentials = strategy.authenticate(&config).await.credentials.unwrap();
        strategy
            .execute_request(
                &spec("curl https://x.io/data?page=1"),
                &config,
                &credentials,
                &ExecOptions::default(),
            )
            .await;
        transport.requests().remove(0)
    }

    #[tokio::test]
    async fn test_header_with_prefix() {
        let sent = send_with(AuthenticationConfig::ApiKey {
            key: Secret::new("k1"),
            name: "Authorization".to_string(),
            location: ApiKeyLocation::Header,
            prefix: Some("Token".to_string()),
        })
        .await;
        assert_eq!(sent.header("Authorization"), Some("Token k1"));
    }

    #[tokio::test]
    async fn test_query_parameter() {
        let sent = send_with(AuthenticationConfig::ApiKey {
            key: Secret::new("k 2"),
            name: "api_key".to_string(),
            location: ApiKeyLocation::Query,
            prefix: None,
        })
        .await;
        assert_eq!(sent.url, "https://x.io/data?page=1&api_key=k+2");
    }

    #[tokio::test]
    async fn test_missing_key_fails() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let outcome = ApiKeyStrategy::new(ctx)
            .authenticate(&AuthenticationConfig::api_key_header("X-Key", ""))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
