//! SOAP 1.1 / 1.2 over HTTP.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, HttpMethod, ProtocolPayload, ProtocolType, RequestSpec, Secret,
    SoapVersion,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

#[allow(clippy::expect_used)]
static FAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z0-9_.-]+:)?Fault[\s>/]").expect("valid regex")
});

#[allow(clippy::expect_used)]
static FAULT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_.-]+:)?(?:faultstring|Text)(?:\s[^>]*)?>(.*?)</")
        .expect("valid regex")
});

/// Escapes text for use in XML content and attributes.
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Builds a WS-Security `UsernameToken` header block.
#[must_use]
pub fn username_token(username: &str, password: &str) -> String {
    format!(
        r#"<wsse:Security xmlns:wsse="{WSSE_NS}"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="{PASSWORD_TEXT}">{}</wsse:Password></wsse:UsernameToken></wsse:Security>"#,
        xml_escape(username),
        xml_escape(password)
    )
}

/// Builds a complete envelope.
#[must_use]
pub fn envelope(
    version: SoapVersion,
    namespaces: &BTreeMap<String, String>,
    header_xml: Option<&str>,
    body_xml: &str,
) -> String {
    let ns = match version {
        SoapVersion::V11 => SOAP11_NS,
        SoapVersion::V12 => SOAP12_NS,
    };
    let mut out = format!(r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{ns}""#);
    for (prefix, uri) in namespaces {
        out.push_str(&format!(r#" xmlns:{prefix}="{}""#, xml_escape(uri)));
    }
    out.push('>');
    if let Some(header) = header_xml.filter(|h| !h.is_empty()) {
        out.push_str(&format!("<soap:Header>{header}</soap:Header>"));
    }
    out.push_str(&format!("<soap:Body>{body_xml}</soap:Body></soap:Envelope>"));
    out
}

/// Returns the fault message if `body` holds a SOAP fault.
#[must_use]
pub fn fault_message(body: &str) -> Option<String> {
    if !FAULT.is_match(body) {
        return None;
    }
    Some(
        FAULT_TEXT
            .captures(body)
            .and_then(|c| c.get(1))
            .map_or_else(|| "SOAP fault".to_string(), |m| m.as_str().trim().to_string()),
    )
}

/// Sends SOAP envelopes, optionally with a WS-Security header.
#[derive(Debug, Clone)]
pub struct SoapStrategy {
    context: StrategyContext,
}

struct SoapSettings<'a> {
    endpoint: &'a str,
    version: SoapVersion,
    security: Option<String>,
    namespaces: &'a BTreeMap<String, String>,
}

impl SoapStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    fn settings(config: &AuthenticationConfig) -> Result<SoapSettings<'_>, AuthError> {
        let AuthenticationConfig::Soap {
            endpoint,
            version,
            username,
            password,
            namespaces,
        } = config
        else {
            return Err(AuthError::invalid_config("expected a soap configuration"));
        };
        if endpoint.is_empty() {
            return Err(AuthError::invalid_config("endpoint is required"));
        }
        let security = match (username, password) {
            (Some(user), password) if !user.is_empty() => Some(username_token(
                user,
                password.as_ref().map_or("", Secret::expose),
            )),
            (None, Some(_)) => {
                return Err(AuthError::invalid_config("a WS-Security password needs a username"));
            }
            _ => None,
        };
        Ok(SoapSettings {
            endpoint,
            version: *version,
            security,
            namespaces,
        })
    }
}

#[async_trait]
impl ProtocolStrategy for SoapStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Soap
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        // WS-Security travels inside the envelope, not as request material.
        Self::settings(config).map(|_| Credentials::none()).into()
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let settings = match Self::settings(config) {
            Ok(settings) => settings,
            Err(err) => {
                return HandshakeExecutionResult::failure(
                    &request.name,
                    ExecutionError::new(ErrorCode::AuthError, err.to_string()),
                );
            }
        };

        let mut spec = request.clone();
        let mut action = None;
        if let Some(ProtocolPayload::Soap {
            action: soap_action,
            body_xml,
            header_xml,
        }) = &request.payload
        {
            let header = match (&settings.security, header_xml) {
                (Some(security), Some(extra)) => Some(format!("{security}{extra}")),
                (Some(security), None) => Some(security.clone()),
                (None, extra) => extra.clone(),
            };
            spec.command.body = Some(envelope(
                settings.version,
                settings.namespaces,
                header.as_deref(),
                body_xml,
            ));
            action = Some(soap_action.as_str());
        }

        let mut http = match support::request_options_with_base(&spec, settings.endpoint) {
            Ok(http) => http,
            Err(failure) => return failure,
        };
        http.method = HttpMethod::Post;
        match settings.version {
            SoapVersion::V11 => {
                http.headers.set("Content-Type", "text/xml; charset=utf-8");
                if let Some(action) = action {
                    http.headers.set("SOAPAction", format!("\"{action}\""));
                }
            }
            SoapVersion::V12 => {
                let content_type = match action {
                    Some(action) => {
                        format!("application/soap+xml; charset=utf-8; action=\"{action}\"")
                    }
                    None => "application/soap+xml; charset=utf-8".to_string(),
                };
                http.headers.set("Content-Type", content_type);
            }
        }
        support::apply_credentials(&mut http, credentials);

        let result = support::send(&self.context, &request.name, http, options).await;
        match fault_message(&result.body) {
            Some(fault) => {
                let code = result.error_code().unwrap_or(ErrorCode::ServerError);
                result.into_failed(ExecutionError::new(code, format!("SOAP fault: {fault}")))
            }
            None => result,
        }
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        Self::settings(config).is_ok()
    }
}
