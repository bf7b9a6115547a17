//! Request plumbing shared by the HTTP-based strategies.

use tether_domain::{
    CredentialMaterial, Credentials, ExecutionError, HandshakeExecutionResult, LogEntry, LogLevel,
    RequestOptions, RequestSpec, StatusCode, TimingMetrics,
};
use tracing::debug;

use super::{ExecOptions, StrategyContext};
use crate::command::to_request_options;
use crate::ports::{TransportError, TransportRequest};
use crate::sanitizer::Sanitizer;

/// Converts a request's command into request options.
///
/// A command that cannot be executed yields a finished failure result.
pub fn request_options(request: &RequestSpec) -> Result<RequestOptions, HandshakeExecutionResult> {
    to_request_options(&request.command).map_err(|err| {
        HandshakeExecutionResult::failure(
            &request.name,
            ExecutionError::new(err.code(), err.to_string()),
        )
    })
}

/// Joins a possibly relative URL onto `base`; absolute URLs are kept.
pub fn join_url(base: &str, url: &str) -> String {
    if url.contains("://") || base.is_empty() {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// Like [`request_options`], but a missing or relative URL is resolved
/// against `base`.
pub fn request_options_with_base(
    request: &RequestSpec,
    base: &str,
) -> Result<RequestOptions, HandshakeExecutionResult> {
    let mut request = request.clone();
    request.command.url = Some(match request.command.url.take() {
        Some(url) if !url.trim().is_empty() => join_url(base, &url),
        _ => base.to_string(),
    });
    request_options(&request)
}

/// Appends a query parameter to `url`, keeping the rest intact.
pub fn append_query(url: &str, name: &str, value: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(name, value);
            parsed.into()
        }
        Err(_) => {
            let pair: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair(name, value)
                .finish();
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{pair}")
        }
    }
}

/// Attaches credential material to a request.
///
/// Headers already present on the request win over credential headers.
pub fn apply_credentials(options: &mut RequestOptions, credentials: &Credentials) {
    match &credentials.material {
        CredentialMaterial::None => {}
        CredentialMaterial::Header { name, value } => {
            options.headers.set_if_absent(name.clone(), value.expose());
        }
        CredentialMaterial::QueryParam { name, value } => {
            options.url = append_query(&options.url, name, value.expose());
        }
        CredentialMaterial::Cookie { name, value } => {
            let pair = format!("{name}={}", value.expose());
            let cookie = match options.headers.get("Cookie") {
                Some(existing) if !existing.is_empty() => format!("{existing}; {pair}"),
                _ => pair,
            };
            options.headers.set("Cookie", cookie);
        }
    }
}

/// Maps a transport failure to an execution error with secrets masked.
///
/// Transport messages may quote the request URL.
pub fn transport_failure(sanitizer: &Sanitizer, err: &TransportError) -> ExecutionError {
    ExecutionError::new(err.code(), sanitizer.sanitize_text(&err.to_string()))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Sends one attempt and builds its result.
pub async fn send(
    context: &StrategyContext,
    name: &str,
    mut options: RequestOptions,
    exec: &ExecOptions,
) -> HandshakeExecutionResult {
    if let Some(user_agent) = &exec.user_agent {
        options.headers.set_if_absent("User-Agent", user_agent.clone());
    }

    let mut request = TransportRequest::from_options(&options, exec.timeout);
    request.timeout = request.timeout.min(exec.timeout);
    request.abort = exec.abort.clone();

    let safe_url = context.sanitizer.sanitize_text(&options.url);
    debug!(method = %options.method, url = %safe_url, "sending request");

    let started_at = context.clock.now();
    let instant = std::time::Instant::now();
    let outcome = context.transport.send(request).await;
    let elapsed = millis(instant.elapsed());

    match outcome {
        Ok(response) => {
            let duration = if response.duration.is_zero() {
                elapsed
            } else {
                millis(response.duration)
            };
            let entry = LogEntry::new(
                context.clock.now(),
                LogLevel::Info,
                format!(
                    "{} {safe_url} -> {} ({duration}ms)",
                    options.method, response.status
                ),
            );
            HandshakeExecutionResult::from_response(
                name,
                StatusCode(response.status),
                response.headers,
                response.body,
            )
            .with_timing(TimingMetrics {
                started_at: Some(started_at),
                last_attempt_ms: duration,
                total_ms: duration,
            })
            .with_logs([entry])
        }
        Err(err) => {
            let error = transport_failure(&context.sanitizer, &err);
            debug!(error = %error.message, url = %safe_url, "transport failure");
            let entry = LogEntry::new(
                context.clock.now(),
                LogLevel::Error,
                format!("{} {safe_url} failed: {}", options.method, error.message),
            );
            HandshakeExecutionResult::failure(name, error)
                .with_timing(TimingMetrics {
                    started_at: Some(started_at),
                    last_attempt_ms: elapsed,
                    total_ms: elapsed,
                })
                .with_logs([entry])
        }
    }
}

/// Converts a request and sends it with credentials attached.
pub async fn send_spec(
    context: &StrategyContext,
    request: &RequestSpec,
    credentials: &Credentials,
    exec: &ExecOptions,
) -> HandshakeExecutionResult {
    let mut options = match request_options(request) {
        Ok(options) => options,
        Err(failure) => return failure,
    };
    apply_credentials(&mut options, credentials);
    send(context, &request.name, options, exec).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::{ScriptedTransport, TransportResponse};
    use crate::protocols::test_support::{context, spec};
    use pretty_assertions::assert_eq;
    use tether_domain::{ErrorCode, HttpMethod, Secret};

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://x.io/", "/a/b"), "https://x.io/a/b");
        assert_eq!(join_url("https://x.io", "https://y.io/c"), "https://y.io/c");
    }

    #[test]
    fn test_request_options_with_base_fills_missing_url() {
        let options = request_options_with_base(&spec("curl -d 'x'"), "https://api.io/graphql").unwrap();
        assert_eq!(options.url, "https://api.io/graphql");
        assert_eq!(options.method, HttpMethod::Post);
    }

    #[test]
    fn test_append_query() {
        assert_eq!(
            append_query("https://x.io/a?b=1", "api_key", "k y"),
            "https://x.io/a?b=1&api_key=k+y"
        );
        assert_eq!(append_query("relative/path", "k", "v"), "relative/path?k=v");
    }

    #[test]
    fn test_apply_credentials_keeps_explicit_header() {
        let mut options = RequestOptions::get("https://x.io").with_header("Authorization", "mine");
        apply_credentials(&mut options, &Credentials::header("Authorization", "theirs"));
        assert_eq!(options.headers.get("Authorization"), Some("mine"));
    }

    #[test]
    fn test_apply_cookie_credentials() {
        let mut options = RequestOptions::get("https://x.io").with_header("Cookie", "a=1");
        let credentials = Credentials {
            material: CredentialMaterial::Cookie {
                name: "sid".to_string(),
                value: Secret::new("s"),
            },
            refresh: None,
        };
        apply_credentials(&mut options, &credentials);
        assert_eq!(options.headers.get("Cookie"), Some("a=1; sid=s"));
    }

    #[tokio::test]
    async fn test_send_spec_success_and_failure() {
        let transport = ScriptedTransport::new()
            .then(Ok(TransportResponse::new(200, r#"{"ok":true}"#)))
            .then(Err(TransportError::Connection("refused".to_string())));
        let (ctx, _) = context(&transport);
        let exec = ExecOptions::default();

        let ok = send_spec(&ctx, &spec("curl https://x.io"), &Credentials::none(), &exec).await;
        assert!(ok.success);
        assert_eq!(ok.body_json, Some(serde_json::json!({"ok": true})));

        let failed = send_spec(&ctx, &spec("curl https://x.io"), &Credentials::none(), &exec).await;
        assert_eq!(failed.error_code(), Some(ErrorCode::NetworkError));
        assert_eq!(transport.requests()[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_transport_message_is_masked() {
        let transport = ScriptedTransport::always(Err(TransportError::Connection(
            "error sending request for url (https://x.io/v1?access_key=hunter2)".to_string(),
        )));
        let (ctx, _) = context(&transport);

        let failed = send_spec(
            &ctx,
            &spec("curl 'https://x.io/v1?access_key=hunter2'"),
            &Credentials::none(),
            &ExecOptions::default(),
        )
        .await;
        let error = failed.error.unwrap();
        assert_eq!(error.code, ErrorCode::NetworkError);
        assert!(error.message.contains("access_key=[REDACTED]"), "{}", error.message);
        assert!(failed.logs.iter().all(|l| !l.message.contains("hunter2")));
    }

    #[tokio::test]
    async fn test_send_spec_reports_unusable_command() {
        let transport = ScriptedTransport::new();
        let (ctx, _) = context(&transport);
        let result = send_spec(&ctx, &spec(""), &Credentials::none(), &ExecOptions::default()).await;
        assert_eq!(result.error_code(), Some(ErrorCode::NoCommand));
        assert_eq!(transport.call_count(), 0);
    }
}
