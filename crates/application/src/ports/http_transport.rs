//! HTTP transport port

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tether_domain::{ErrorCode, HttpMethod, RequestOptions};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A request handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL, query string included.
    pub url: String,
    /// Header pairs in send order.
    pub headers: Vec<(String, String)>,
    /// Body, if any.
    pub body: Option<String>,
    /// Upper bound for the call.
    pub timeout: Duration,
    /// Follow 3xx responses.
    pub follow_redirects: bool,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Fires when the caller abandons the request.
    pub abort: CancellationToken,
}

impl TransportRequest {
    /// Builds a transport request from request options.
    #[must_use]
    pub fn from_options(options: &RequestOptions, default_timeout: Duration) -> Self {
        Self {
            method: options.method,
            url: options.url.clone(),
            headers: options.headers.to_pairs(),
            body: options.body.clone(),
            timeout: options.timeout.unwrap_or(default_timeout),
            follow_redirects: options.follow_redirects,
            insecure: options.insecure,
            abort: CancellationToken::new(),
        }
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response received from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Body as text.
    pub body: String,
    /// Time spent on the call.
    pub duration: Duration,
}

impl TransportResponse {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            duration: Duration::ZERO,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Classified transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Host name resolution failed.
    #[error("DNS resolution failed for {host}: {message}")]
    Dns {
        /// Host that failed to resolve.
        host: String,
        /// Underlying message.
        message: String,
    },

    /// Connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call exceeded its time budget.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// TLS handshake or certificate failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Redirect limit exceeded.
    #[error("too many redirects (max {max})")]
    TooManyRedirects {
        /// Redirect limit.
        max: usize,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request was aborted by its caller.
    #[error("request cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Maps this failure to the execution error taxonomy.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Dns { .. } => ErrorCode::DnsError,
            Self::Connection(_) => ErrorCode::NetworkError,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Tls(_) => ErrorCode::SslError,
            Self::TooManyRedirects { .. } => ErrorCode::RedirectError,
            Self::InvalidUrl(_) => ErrorCode::ParseError,
            Self::Cancelled | Self::Other(_) => ErrorCode::Unknown,
        }
    }
}

/// Port for performing HTTP calls.
///
/// Implementations must honour `request.abort` and `request.timeout` and
/// classify every failure into a [`TransportError`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and returns the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was received.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
