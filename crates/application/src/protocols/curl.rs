//! Plain cURL commands: no authentication step.

use async_trait::async_trait;
use tether_domain::{
    AuthenticationConfig, Credentials, HandshakeExecutionResult, ProtocolType, RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// Sends each request's command as written.
#[derive(Debug, Clone)]
pub struct CurlStrategy {
    context: StrategyContext,
}

impl CurlStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ProtocolStrategy for CurlStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Curl
    }

    async fn authenticate(&self, _config: &AuthenticationConfig) -> AuthOutcome {
        AuthOutcome::anonymous()
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
        matches!(config, AuthenticationConfig::Curl)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;
    use tether_domain::HttpMethod;

    #[tokio::test]
    async fn test_sends_command_as_written() {
        let transport = ScriptedTransport::new().then(Ok(TransportResponse::new(201, "{}")));
        let (ctx, _) = context(&transport);
        let strategy = CurlStrategy::new(ctx);
        let config = AuthenticationConfig::Curl;

        let auth = strategy.authenticate(&config).await;
        assert!(auth.success);

        let result = strategy
            .execute_request(
                &spec(r#"curl -X POST 'https://x.io/items' -H 'K: V' -d '{"a":1}'"#),
                &config,
                &auth.credentials.unwrap(),
                &ExecOptions::default(),
            )
            .await;
        assert!(result.success);

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.url, "https://x.io/items");
        assert_eq!(sent.header("K"), Some("V"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let strategy = CurlStrategy::new(ctx);
        assert!(strategy.health_check(&AuthenticationConfig::Curl).await);
        assert!(!strategy.health_check(&AuthenticationConfig::basic("u", "p")).await);
    }
}
