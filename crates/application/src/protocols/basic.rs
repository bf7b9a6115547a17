//! HTTP Basic authentication.

use async_trait::async_trait;
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, HandshakeExecutionResult, ProtocolType,
    RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};
use crate::crypto;

/// Builds the `Authorization` value for a user and password.
#[must_use]
pub fn basic_header_value(username: &str, password: &str) -> String {
    let pair = format!("{username}:{password}");
    format!("Basic {}", crypto::base64_encode(pair.as_bytes()))
}

/// Sends `Authorization: Basic base64(user:pass)` with every request.
#[derive(Debug, Clone)]
pub struct BasicStrategy {
    context: StrategyContext,
}

impl BasicStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn credentials(config: &AuthenticationConfig) -> Result<Credentials, AuthError> {
        let AuthenticationConfig::Basic { username, password } = config else {
            return Err(AuthError::invalid_config("expected a basic configuration"));
        };
        if username.is_empty() {
            return Err(AuthError::invalid_config("username is required"));
        }
        Ok(Credentials::header(
            "Authorization",
            basic_header_value(username, password.expose()),
        ))
    }
}

#[async_trait]
impl ProtocolStrategy for BasicStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Basic
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

    #[tokio::test]
    async fn test_basic_header_is_attached() {
        let transport = ScriptedTransport::new();
        let (ctx, _) = context(&transport);
        let strategy = BasicStrategy::new(ctx);
        let config = AuthenticationConfig::basic("alice", "secret");

        let auth = strategy.authenticate(&config).await;
        let credentials = auth.credentials.unwrap();
        strategy
            .execute_request(&spec("curl https://x.io"), &config, &credentials, &ExecOptions::default())
            .await;

        assert_eq!(
            transport.requests()[0].header("Authorization"),
            Some("Basic YWxpY2U6c2VjcmV0")
        );
    }

    #[tokio::test]
    async fn test_rejects_empty_username_and_wrong_config() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let strategy = BasicStrategy::new(ctx);
        assert!(!strategy.authenticate(&AuthenticationConfig::basic("", "p")).await.success);
        assert!(!strategy.health_check(&AuthenticationConfig::Curl).await);
    }
}
