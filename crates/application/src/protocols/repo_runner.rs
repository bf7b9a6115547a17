//! Requests against a source repository host.
//!
//! Relative request URLs address files in the repository at the configured
//! ref; a request without a URL fetches the repository's API metadata.

use async_trait::async_trait;
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, ProtocolType, RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

const API_ACCEPT: &str = "application/vnd.github+json";

fn valid_repository(repository: &str) -> bool {
    let mut parts = repository.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

struct Repo<'a> {
    repository: &'a str,
    git_ref: &'a str,
    raw_base_url: &'a str,
    api_base_url: &'a str,
}

impl Repo<'_> {
    fn raw_base(&self) -> String {
        format!(
            "{}/{}/{}",
            self.raw_base_url.trim_end_matches('/'),
            self.repository,
            self.git_ref
        )
    }

    fn api_url(&self) -> String {
        format!(
            "{}/repos/{}",
            self.api_base_url.trim_end_matches('/'),
            self.repository
        )
    }
}

/// Fetches files and metadata from a repository host.
#[derive(Debug, Clone)]
pub struct RepoRunnerStrategy {
    context: StrategyContext,
}

impl RepoRunnerStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn repo(config: &AuthenticationConfig) -> Result<Repo<'_>, AuthError> {
        let AuthenticationConfig::RepoRunner {
            repository,
            git_ref,
            raw_base_url,
            api_base_url,
            ..
        } = config
        else {
            return Err(AuthError::invalid_config("expected a repo_runner configuration"));
        };
        if !valid_repository(repository) {
            return Err(AuthError::invalid_config(format!(
                "repository must be owner/name, got '{repository}'"
            )));
        }
        if git_ref.trim().is_empty() {
            return Err(AuthError::invalid_config("git_ref is required"));
        }
        Ok(Repo {
            repository,
            git_ref,
            raw_base_url,
            api_base_url,
        })
    }
}

#[async_trait]
impl ProtocolStrategy for RepoRunnerStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::RepoRunner
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        if let Err(err) = Self::repo(config) {
            return AuthOutcome::failed(err);
        }
        match config {
            AuthenticationConfig::RepoRunner {
                token: Some(token), ..
            } if !token.is_empty() => AuthOutcome::authenticated(Credentials::header(
                "Authorization",
                format!("Bearer {}", token.expose()),
            )),
            _ => AuthOutcome::anonymous(),
        }
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let repo = match Self::repo(config) {
            Ok(repo) => repo,
            Err(err) => {
                return HandshakeExecutionResult::failure(
                    &request.name,
                    ExecutionError::new(ErrorCode::AuthError, err.to_string()),
                );
            }
        };

        let has_url = request
            .command
            .url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        let base = if has_url {
            repo.raw_base()
        } else {
            repo.api_url()
        };
        let mut http = match support::request_options_with_base(request, &base) {
            Ok(http) => http,
            Err(failure) => return failure,
        };
        if http.url.starts_with(repo.api_base_url) {
            http.headers.set_if_absent("Accept", API_ACCEPT);
        }
        support::apply_credentials(&mut http, credentials);
        support::send(&self.context, &request.name, http, options).await
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        Self::repo(config).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;
    use tether_domain::Secret;

    fn config(repository: &str, token: Option<&str>) -> AuthenticationConfig {
        AuthenticationConfig::RepoRunner {
            repository: repository.to_string(),
            git_ref: "v1.2".to_string(),
            raw_base_url: "https://raw.example.com".to_string(),
            api_base_url: "https://api.example.com".to_string(),
            token: token.map(Secret::new),
        }
    }

    #[test]
    fn test_valid_repository() {
        assert!(valid_repository("acme/widgets"));
        assert!(!valid_repository("acme"));
        assert!(!valid_repository("acme/"));
        assert!(!valid_repository("a/b/c"));
    }

    #[tokio::test]
    async fn test_relative_path_reads_raw_file() {
        let transport = ScriptedTransport::always(Ok(TransportResponse::new(200, "name: demo")));
        let (ctx, _) = context(&transport);
        let strategy = RepoRunnerStrategy::new(ctx);
        let config = config("acme/widgets", Some("ghp"));

        let credentials = strategy.authenticate(&config).await.credentials.unwrap();
        let result = strategy
            .execute_request(
                &spec("curl /deploy/handshake.yaml"),
                &config,
                &credentials,
                &ExecOptions::default(),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.body, "name: demo");

        let sent = &transport.requests()[0];
        assert_eq!(
            sent.url,
            "https://raw.example.com/acme/widgets/v1.2/deploy/handshake.yaml"
        );
        assert_eq!(sent.header("Authorization"), Some("Bearer ghp"));
        assert_eq!(sent.header("Accept"), None);
    }

    #[tokio::test]
    async fn test_missing_url_reads_repository_metadata() {
        let transport = ScriptedTransport::always(Ok(TransportResponse::new(200, "{}")));
        let (ctx, _) = context(&transport);
        let strategy = RepoRunnerStrategy::new(ctx);
        let config = config("acme/widgets", None);

        assert!(strategy.authenticate(&config).await.success);
        strategy
            .execute_request(&spec("curl -H 'X-Trace: 1'"), &config, &Credentials::none(), &ExecOptions::default())
            .await;

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.example.com/repos/acme/widgets");
        assert_eq!(sent.header("Accept"), Some(API_ACCEPT));
    }

    #[tokio::test]
    async fn test_rejects_malformed_repository() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let strategy = RepoRunnerStrategy::new(ctx);
        let config = config("widgets", None);
        assert!(!strategy.health_check(&config).await);
        assert!(!strategy.authenticate(&config).await.success);
    }
}
