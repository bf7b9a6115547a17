//! Execution result types.
//!
//! A [`HandshakeExecutionResult`] is produced once per executed request and
//! never changes after it has been built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::{StatusCategory, StatusCode};

/// Classification code carried by every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No command text was supplied.
    NoCommand,
    /// Command or template text could not be processed.
    ParseError,
    /// Generic network failure (connection reset, refused, ...).
    NetworkError,
    /// The attempt exceeded its time budget.
    Timeout,
    /// Host name resolution failed.
    DnsError,
    /// TLS handshake or certificate failure.
    SslError,
    /// Redirect loop or redirect limit exceeded.
    RedirectError,
    /// 4xx response.
    ClientError,
    /// 5xx response.
    ServerError,
    /// Authentication step failed.
    AuthError,
    /// Anything else.
    Unknown,
}

impl ErrorCode {
    /// Returns the wire identifier (e.g. `NETWORK_ERROR`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoCommand => "NO_COMMAND",
            Self::ParseError => "PARSE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::DnsError => "DNS_ERROR",
            Self::SslError => "SSL_ERROR",
            Self::RedirectError => "REDIRECT_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns a human-readable title for this code.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::NoCommand => "No Command",
            Self::ParseError => "Parse Error",
            Self::NetworkError => "Network Error",
            Self::Timeout => "Request Timeout",
            Self::DnsError => "DNS Resolution Failed",
            Self::SslError => "SSL/TLS Error",
            Self::RedirectError => "Redirect Error",
            Self::ClientError => "Client Error",
            Self::ServerError => "Server Error",
            Self::AuthError => "Authentication Failed",
            Self::Unknown => "Unknown Error",
        }
    }

    /// Returns user-facing suggestions for this code.
    #[must_use]
    pub const fn suggestions(&self) -> &[&'static str] {
        match self {
            Self::NoCommand => &["Enter a cURL command for this request"],
            Self::ParseError => &[
                "Check the quoting of the command",
                "Verify that every placeholder has a value",
            ],
            Self::NetworkError => &[
                "Check if the server is running",
                "Verify your internet connection",
            ],
            Self::Timeout => &[
                "The server may be slow or overloaded",
                "Try increasing the timeout value",
            ],
            Self::DnsError => &[
                "Check if the hostname is correct",
                "Try using an IP address instead",
            ],
            Self::SslError => &[
                "The server's certificate may be invalid or expired",
                "Verify the hostname matches the certificate",
            ],
            Self::RedirectError => &[
                "The server may have a redirect loop",
                "Try the final URL directly",
            ],
            Self::ClientError => &[
                "Check the request parameters and headers",
                "Verify the endpoint path",
            ],
            Self::ServerError => &["The server failed to handle the request; retry later"],
            Self::AuthError => &[
                "Check the client credentials",
                "Verify the token endpoint and scopes",
            ],
            Self::Unknown => &["Check the error details for more information"],
        }
    }

    /// Returns true if this code describes a transient failure worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::DnsError | Self::Timeout | Self::ServerError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Classification code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional technical details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExecutionError {
    /// Creates a new error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches technical details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ExecutionError {}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

/// One log line emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Message text. Secrets are masked before an entry is built.
    pub message: String,
}

impl LogEntry {
    /// Creates a log entry stamped with the given time.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }
}

/// Timing of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// Time spent in the final attempt, in milliseconds.
    pub last_attempt_ms: u64,
    /// Wall time across all attempts and backoff delays, in milliseconds.
    pub total_ms: u64,
}

/// Retry bookkeeping attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Number of attempts performed (1 when no retry happened).
    pub attempts: u32,
    /// Backoff delays slept between attempts, in milliseconds.
    #[serde(default)]
    pub delays_ms: Vec<u64>,
    /// Sum of `delays_ms`.
    pub total_delay_ms: u64,
}

impl RetryMetadata {
    /// Metadata for a single attempt without retries.
    #[must_use]
    pub fn single() -> Self {
        Self {
            attempts: 1,
            delays_ms: Vec::new(),
            total_delay_ms: 0,
        }
    }

    /// Returns true if at least one retry happened.
    #[must_use]
    pub const fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Outcome of one executed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeExecutionResult {
    /// Name of the request template this result belongs to.
    pub request_name: String,
    /// True when the request is considered successful by its strategy.
    pub success: bool,
    /// HTTP (or protocol-mapped) status, if a response arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusCode>,
    /// Category of `status`.
    pub status_category: StatusCategory,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw response body.
    #[serde(default)]
    pub body: String,
    /// Typed body (JSON, or strategy-specific structure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_json: Option<serde_json::Value>,
    /// Timing information.
    #[serde(default)]
    pub timing: TimingMetrics,
    /// Logs collected while producing this result.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Failure classification, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Retry bookkeeping.
    #[serde(default)]
    pub retry: RetryMetadata,
}

impl HandshakeExecutionResult {
    /// Builds a result from a received response.
    ///
    /// Success follows the status: 2xx (and 3xx, which only arrive when
    /// redirects are not followed) succeed, 4xx and 5xx fail with the
    /// matching code.
    #[must_use]
    pub fn from_response(
        request_name: impl Into<String>,
        status: StatusCode,
        headers: BTreeMap<String, String>,
        body: String,
    ) -> Self {
        let body_json = serde_json::from_str(&body).ok();
        let error = if status.is_client_error() {
            Some(ExecutionError::new(
                ErrorCode::ClientError,
                format!("Request failed with status {status}"),
            ))
        } else if status.is_server_error() {
            Some(ExecutionError::new(
                ErrorCode::ServerError,
                format!("Request failed with status {status}"),
            ))
        } else {
            None
        };

        Self {
            request_name: request_name.into(),
            success: error.is_none(),
            status: Some(status),
            status_category: status.category(),
            headers,
            body,
            body_json,
            timing: TimingMetrics::default(),
            logs: Vec::new(),
            error,
            retry: RetryMetadata::single(),
        }
    }

    /// Builds a failed result without a response.
    #[must_use]
    pub fn failure(request_name: impl Into<String>, error: ExecutionError) -> Self {
        Self {
            request_name: request_name.into(),
            success: false,
            status: None,
            status_category: StatusCategory::Unknown,
            headers: BTreeMap::new(),
            body: String::new(),
            body_json: None,
            timing: TimingMetrics::default(),
            logs: Vec::new(),
            error: Some(error),
            retry: RetryMetadata::single(),
        }
    }

    /// Marks the result failed with the given error, keeping the response data.
    #[must_use]
    pub fn into_failed(mut self, error: ExecutionError) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }

    /// Replaces the typed body.
    #[must_use]
    pub fn with_body_json(mut self, value: serde_json::Value) -> Self {
        self.body_json = Some(value);
        self
    }

    /// Replaces the timing information.
    #[must_use]
    pub const fn with_timing(mut self, timing: TimingMetrics) -> Self {
        self.timing = timing;
        self
    }

    /// Replaces the retry metadata.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryMetadata) -> Self {
        self.retry = retry;
        self
    }

    /// Appends log entries.
    #[must_use]
    pub fn with_logs(mut self, logs: impl IntoIterator<Item = LogEntry>) -> Self {
        self.logs.extend(logs);
        self
    }

    /// Returns the error code, if the result failed.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
