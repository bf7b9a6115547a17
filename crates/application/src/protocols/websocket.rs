//! WebSocket connect/send/receive exchanges.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tether_domain::{
    AuthError, AuthenticationConfig, CredentialMaterial, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, LogEntry, LogLevel, ProtocolPayload, ProtocolType, RequestSpec,
    StatusCode, TimingMetrics,
};
use tracing::debug;

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};
use crate::ports::WebSocketExchange;

fn is_ws_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

/// Exchanges messages over the injected WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketStrategy {
    context: StrategyContext,
}

impl WebSocketStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn credentials(config: &AuthenticationConfig) -> Result<Credentials, AuthError> {
        let AuthenticationConfig::WebSocket {
            url, bearer_token, ..
        } = config
        else {
            return Err(AuthError::invalid_config("expected a websocket configuration"));
        };
        if !is_ws_url(url) {
            return Err(AuthError::invalid_config("url must start with ws:// or wss://"));
        }
        Ok(match bearer_token.as_ref().filter(|t| !t.is_empty()) {
            Some(token) => {
                Credentials::header("Authorization", format!("Bearer {}", token.expose()))
            }
            None => Credentials::none(),
        })
    }

    fn exchange(
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> WebSocketExchange {
        let (base_url, static_headers, subprotocols) = match config {
            AuthenticationConfig::WebSocket {
                url,
                headers,
                subprotocols,
                ..
            } => (url.as_str(), headers.clone(), subprotocols.clone()),
            _ => ("", BTreeMap::new(), Vec::new()),
        };

        let url = request
            .command
            .url
            .as_deref()
            .filter(|u| is_ws_url(u))
            .unwrap_or(base_url)
            .to_string();

        let mut headers = request.command.headers.clone();
        for (name, value) in static_headers {
            headers.set_if_absent(name, value);
        }
        if let CredentialMaterial::Header { name, value } = &credentials.material {
            headers.set_if_absent(name.clone(), value.expose());
        }

        let (messages, expect_messages) = match &request.payload {
            Some(ProtocolPayload::WebSocket {
                messages,
                expect_messages,
            }) => (messages.clone(), *expect_messages),
            _ => (request.command.body.clone().into_iter().collect(), 1),
        };

        WebSocketExchange {
            url,
            headers: headers.to_pairs(),
            subprotocols,
            messages,
            expect_messages,
            timeout: options.timeout,
            abort: options.abort.clone(),
        }
    }
}

#[async_trait]
impl ProtocolStrategy for WebSocketStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::WebSocket
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        Self::credentials(config).into()
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let Some(transport) = &self.context.websocket else {
            return HandshakeExecutionResult::failure(
                &request.name,
                ExecutionError::new(ErrorCode::Unknown, "no WebSocket transport configured"),
            );
        };

        let exchange = Self::exchange(request, config, credentials, options);
        let safe_url = self.context.sanitizer.sanitize_text(&exchange.url);
        debug!(url = %safe_url, messages = exchange.messages.len(), "websocket exchange");

        let started_at = self.context.clock.now();
        let instant = std::time::Instant::now();
        let outcome = transport.exchange(exchange).await;
        let elapsed = u64::try_from(instant.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timing = TimingMetrics {
            started_at: Some(started_at),
            last_attempt_ms: elapsed,
            total_ms: elapsed,
        };

        match outcome {
            Ok(replies) => {
                let typed: Vec<Value> = replies
                    .iter()
                    .map(|m| serde_json::from_str(m).unwrap_or_else(|_| Value::String(m.clone())))
                    .collect();
                let entry = LogEntry::new(
                    self.context.clock.now(),
                    LogLevel::Info,
                    format!("WS {safe_url} -> {} message(s)", replies.len()),
                );
                HandshakeExecutionResult::from_response(
                    &request.name,
                    StatusCode(101),
                    BTreeMap::new(),
                    replies.join("\n"),
                )
                .with_body_json(Value::Array(typed))
                .with_timing(timing)
                .with_logs([entry])
            }
            Err(err) => HandshakeExecutionResult::failure(
                &request.name,
                support::transport_failure(&self.context.sanitizer, &err),
            )
            .with_timing(timing),
        }
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        self.context.websocket.is_some() && Self::credentials(config).is_ok()
    }
}
