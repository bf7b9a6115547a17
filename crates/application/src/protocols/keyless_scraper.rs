//! Unauthenticated page fetches with optional regex extraction.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, ProtocolType, RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// User agent sent when the configuration does not override it.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const BROWSER_LANGUAGE: &str = "en-US,en;q=0.9";

/// Collects every match of `pattern` in `body`.
///
/// Named groups produce objects, a single unnamed group produces its text,
/// and a pattern without groups produces the whole match.
#[must_use]
pub fn extract(pattern: &Regex, body: &str) -> Value {
    let names: Vec<&str> = pattern.capture_names().flatten().collect();
    let matches = pattern
        .captures_iter(body)
        .map(|caps| {
            if names.is_empty() {
                let m = caps.get(1).or_else(|| caps.get(0));
                return m.map_or(Value::Null, |m| Value::String(m.as_str().to_string()));
            }
            let object: Map<String, Value> = names
                .iter()
                .map(|name| {
                    let value = caps
                        .name(name)
                        .map_or(Value::Null, |m| Value::String(m.as_str().to_string()));
                    ((*name).to_string(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect::<Vec<_>>();
    json!({ "matches": matches })
}

/// Fetches public pages with browser-like headers.
#[derive(Debug, Clone)]
pub struct KeylessScraperStrategy {
    context: StrategyContext,
}

impl KeylessScraperStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn pattern(config: &AuthenticationConfig) -> Result<Option<Regex>, AuthError> {
        match config {
            AuthenticationConfig::KeylessScraper {
                extract_pattern: Some(pattern),
                ..
            } if !pattern.is_empty() => Regex::new(pattern)
                .map(Some)
                .map_err(|e| AuthError::invalid_config(format!("invalid extract pattern: {e}"))),
            AuthenticationConfig::KeylessScraper { .. } => Ok(None),
            _ => Err(AuthError::invalid_config(
                "expected a keyless_scraper configuration",
            )),
        }
    }
}

#[async_trait]
impl ProtocolStrategy for KeylessScraperStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::KeylessScraper
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        Self::pattern(config).map(|_| Credentials::none()).into()
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let pattern = match Self::pattern(config) {
            Ok(pattern) => pattern,
            Err(err) => {
                return HandshakeExecutionResult::failure(
                    &request.name,
                    ExecutionError::new(ErrorCode::ParseError, err.to_string()),
                );
            }
        };

        let mut http = match support::request_options(request) {
            Ok(http) => http,
            Err(failure) => return failure,
        };
        let user_agent = match config {
            AuthenticationConfig::KeylessScraper {
                user_agent: Some(agent),
                ..
            } if !agent.is_empty() => agent.as_str(),
            _ => BROWSER_USER_AGENT,
        };
        http.headers.set_if_absent("User-Agent", user_agent);
        http.headers.set_if_absent("Accept", BROWSER_ACCEPT);
        http.headers.set_if_absent("Accept-Language", BROWSER_LANGUAGE);
        support::apply_credentials(&mut http, credentials);

        let result = support::send(&self.context, &request.name, http, options).await;
        match pattern {
            Some(pattern) if result.success => {
                let extracted = extract(&pattern, &result.body);
                result.with_body_json(extracted)
            }
            _ => result,
        }
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        Self::pattern(config).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;

    fn config(pattern: Option<&str>) -> AuthenticationConfig {
        AuthenticationConfig::KeylessScraper {
            user_agent: None,
            extract_pattern: pattern.map(str::to_string),
        }
    }

    #[test]
    fn test_extract_shapes() {
        let body = "<a href=\"/x\">X</a><a href=\"/y\">Y</a>";
        let single = Regex::new(r#"href="([^"]+)""#).unwrap();
        assert_eq!(extract(&single, body), json!({"matches": ["/x", "/y"]}));

        let named = Regex::new(r#"href="(?P<href>[^"]+)">(?P<text>\w+)"#).unwrap();
        assert_eq!(
            extract(&named, body),
            json!({"matches": [{"href": "/x", "text": "X"}, {"href": "/y", "text": "Y"}]})
        );
    }

    #[tokio::test]
    async fn test_browser_headers_and_extraction() {
        let transport = ScriptedTransport::always(Ok(TransportResponse::new(
            200,
            "<title>Status: green</title>",
        )));
        let (ctx, _) = context(&transport);
        let strategy = KeylessScraperStrategy::new(ctx);
        let config = config(Some(r"Status: (\w+)"));

        let result = strategy
            .execute_request(
                &spec("curl https://status.io"),
                &config,
                &Credentials::none(),
                &ExecOptions::default(),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.body_json, Some(json!({"matches": ["green"]})));

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("User-Agent"), Some(BROWSER_USER_AGENT));
        assert_eq!(sent.header("Accept-Language"), Some(BROWSER_LANGUAGE));
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_parse_error() {
        let transport = ScriptedTransport::new();
        let (ctx, _) = context(&transport);
        let strategy = KeylessScraperStrategy::new(ctx);
        let config = config(Some("(unclosed"));

        assert!(!strategy.authenticate(&config).await.success);
        let result = strategy
            .execute_request(&spec("curl https://x.io"), &config, &Credentials::none(), &ExecOptions::default())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::ParseError));
        assert_eq!(transport.call_count(), 0);
    }
}
