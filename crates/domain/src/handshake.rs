//! Handshake definitions.
//!
//! A handshake is one authentication configuration plus an ordered list of
//! request templates written as cURL-like command text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthenticationConfig, ProtocolType};
use crate::command::ParsedCommand;
use crate::id::HandshakeId;

/// Protocol-specific payload carried next to a request's command text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolPayload {
    /// GraphQL operation.
    #[serde(rename = "graphql")]
    GraphQl {
        /// Query document.
        query: String,
        /// Variables as JSON text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variables: Option<String>,
        /// Operation to run when the document holds several.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_name: Option<String>,
    },
    /// SOAP call.
    Soap {
        /// `SOAPAction` value.
        action: String,
        /// Content of the `Body` element.
        body_xml: String,
        /// Extra content for the `Header` element.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_xml: Option<String>,
    },
    /// WebSocket exchange.
    #[serde(rename = "websocket")]
    WebSocket {
        /// Messages sent in order after connecting.
        messages: Vec<String>,
        /// Number of messages to wait for before closing.
        #[serde(default = "default_expect_messages")]
        expect_messages: usize,
    },
}

const fn default_expect_messages() -> usize {
    1
}

/// One request in a handshake, as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// Display name, used in results and logs.
    pub name: String,
    /// cURL-like command text, possibly with placeholders.
    #[serde(default)]
    pub command: String,
    /// Protocol payload, for protocols whose body is not plain command data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ProtocolPayload>,
}

impl RequestTemplate {
    /// Creates a template from command text.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            payload: None,
        }
    }

    /// Attaches a protocol payload.
    #[must_use]
    pub fn with_payload(mut self, payload: ProtocolPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A request after parsing and placeholder resolution, ready for a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Template name.
    pub name: String,
    /// Parsed, fully resolved command.
    pub command: ParsedCommand,
    /// Resolved protocol payload.
    pub payload: Option<ProtocolPayload>,
}

/// Retry policy for the calls of one handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for one delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Retry POST/PATCH on 5xx and timeouts.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicyConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// A complete handshake definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Identifier.
    #[serde(default)]
    pub id: HandshakeId,
    /// Display name.
    pub name: String,
    /// Authentication configuration; its tag selects the protocol.
    #[serde(default)]
    pub auth: AuthenticationConfig,
    /// Requests executed in order.
    #[serde(default)]
    pub requests: Vec<RequestTemplate>,
    /// Keep executing after a failed request.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Retry policy; engine defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicyConfig>,
    /// Per-attempt timeout in milliseconds; engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Fail on unresolved placeholders; engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_placeholders: Option<bool>,
    /// Variables available to every request template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Handshake {
    /// Creates a handshake with no requests.
    #[must_use]
    pub fn new(name: impl Into<String>, auth: AuthenticationConfig) -> Self {
        Self {
            id: HandshakeId::new(),
            name: name.into(),
            auth,
            requests: Vec::new(),
            continue_on_error: false,
            retry: None,
            timeout_ms: None,
            strict_placeholders: None,
            variables: BTreeMap::new(),
        }
    }

    /// Appends a request template.
    #[must_use]
    pub fn with_request(mut self, request: RequestTemplate) -> Self {
        self.requests.push(request);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicyConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns the protocol selected by the authentication configuration.
    #[must_use]
    pub const fn protocol_type(&self) -> ProtocolType {
        self.auth.protocol_type()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_minimal_handshake() {
        let json = r#"{
            "name": "status",
            "auth": {"type": "curl"},
            "requests": [{"name": "ping", "command": "curl https://example.com"}]
        }"#;
        let handshake: Handshake = serde_json::from_str(json).unwrap();
        assert_eq!(handshake.protocol_type(), ProtocolType::Curl);
        assert_eq!(handshake.requests.len(), 1);
        assert!(handshake.retry.is_none());
    }

    #[test]
    fn test_payload_tag() {
        let payload = ProtocolPayload::WebSocket {
            messages: vec!["ping".to_string()],
            expect_messages: 1,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "websocket");
    }
}
