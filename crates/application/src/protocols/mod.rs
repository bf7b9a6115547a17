//! Authentication strategies
//!
//! One [`ProtocolStrategy`] per protocol type. Every strategy authenticates
//! once per run and then executes single request attempts; retry, timeout
//! and cancellation belong to the execution engine.

mod api_key;
mod basic;
mod curl;
mod graphql;
mod keyless_scraper;
mod oauth2_client_credentials;
mod oauth2_code;
mod repo_runner;
mod soap;
mod support;
mod websocket;

pub mod oauth;
pub mod token_cache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, HandshakeExecutionResult, ProtocolType,
    RequestSpec,
};
use tokio_util::sync::CancellationToken;

use crate::ports::{Clock, HttpTransport, WebSocketTransport};
use crate::sanitizer::Sanitizer;

pub use api_key::ApiKeyStrategy;
pub use basic::BasicStrategy;
pub use curl::CurlStrategy;
pub use graphql::GraphQlStrategy;
pub use keyless_scraper::KeylessScraperStrategy;
pub use oauth2_client_credentials::ClientCredentialsStrategy;
pub use oauth2_code::{AuthorizationCodeStrategy, AuthorizationSession, PkceStrategy};
pub use repo_runner::RepoRunnerStrategy;
pub use soap::SoapStrategy;
pub use token_cache::TokenCache;
pub use websocket::WebSocketStrategy;

/// Result of the authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Whether the strategy may proceed to requests.
    pub success: bool,
    /// Material to attach to requests.
    pub credentials: Option<Credentials>,
    /// Why authentication failed.
    pub error: Option<AuthError>,
}

impl AuthOutcome {
    /// Successful authentication yielding `credentials`.
    #[must_use]
    pub const fn authenticated(credentials: Credentials) -> Self {
        Self {
            success: true,
            credentials: Some(credentials),
            error: None,
        }
    }

    /// Successful authentication that attaches nothing.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::authenticated(Credentials::none())
    }

    /// Failed authentication.
    #[must_use]
    pub const fn failed(error: AuthError) -> Self {
        Self {
            success: false,
            credentials: None,
            error: Some(error),
        }
    }
}

impl From<Result<Credentials, AuthError>> for AuthOutcome {
    fn from(result: Result<Credentials, AuthError>) -> Self {
        match result {
            Ok(credentials) => Self::authenticated(credentials),
            Err(error) => Self::failed(error),
        }
    }
}

/// Per-attempt execution options supplied by the engine.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Upper bound for the attempt.
    pub timeout: Duration,
    /// Fires when the run is cancelled.
    pub abort: CancellationToken,
    /// User agent used when the request sets none.
    pub user_agent: Option<String>,
}

impl ExecOptions {
    /// Options with the given timeout and a fresh abort token.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            abort: CancellationToken::new(),
            user_agent: None,
        }
    }
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

/// Contract shared by all protocol strategies.
#[async_trait]
pub trait ProtocolStrategy: Send + Sync {
    /// The protocol this strategy handles.
    fn protocol_type(&self) -> ProtocolType;

    /// Performs the authentication step.
    ///
    /// Called once per run, before any request.
    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome;

    /// Executes a single attempt of one request.
    ///
    /// Never fails: transport and protocol failures are reported in the
    /// returned result.
    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult;

    /// Returns true if the configuration is usable.
    async fn health_check(&self, config: &AuthenticationConfig) -> bool;
}

/// Collaborators shared by every strategy instance.
#[derive(Clone)]
pub struct StrategyContext {
    /// HTTP transport.
    pub transport: Arc<dyn HttpTransport>,
    /// WebSocket transport, when one is available.
    pub websocket: Option<Arc<dyn WebSocketTransport>>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Token cache shared across runs.
    pub tokens: TokenCache,
    /// Masks secrets in logs.
    pub sanitizer: Sanitizer,
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("websocket", &self.websocket.is_some())
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl StrategyContext {
    /// Creates a context with the given transport and clock.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            websocket: None,
            clock,
            tokens: TokenCache::new(),
            sanitizer: Sanitizer::default(),
        }
    }

    /// Adds a WebSocket transport.
    #[must_use]
    pub fn with_websocket(mut self, websocket: Arc<dyn WebSocketTransport>) -> Self {
        self.websocket = Some(websocket);
        self
    }

    /// Replaces the token cache.
    #[must_use]
    pub fn with_tokens(mut self, tokens: TokenCache) -> Self {
        self.tokens = tokens;
        self
    }

    /// Replaces the sanitizer.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use tether_domain::RequestSpec;

    use super::StrategyContext;
    use crate::command::parse;
    use crate::ports::{FixedClock, ScriptedTransport};

    #[allow(clippy::unwrap_used)]
    pub fn context(transport: &ScriptedTransport) -> (StrategyContext, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let context = StrategyContext::new(Arc::new(transport.clone()), clock.clone());
        (context, clock)
    }

    pub fn spec(command: &str) -> RequestSpec {
        RequestSpec {
            name: "req".to_string(),
            command: parse(command),
            payload: None,
        }
    }
}
