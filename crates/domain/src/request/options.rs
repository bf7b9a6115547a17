//! Transport-ready request description

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Headers, HttpMethod};

/// A fully resolved request, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute target URL.
    pub url: String,
    /// Request headers in send order.
    #[serde(default)]
    pub headers: Headers,
    /// Request body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Whether redirects should be followed.
    #[serde(default)]
    pub follow_redirects: bool,
    /// Whether TLS certificate verification is disabled.
    #[serde(default)]
    pub insecure: bool,
    /// Per-request timeout requested by the command itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Creates a request with the given method and URL and nothing else.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            follow_redirects: false,
            insecure: false,
            timeout: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request with a body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::new(HttpMethod::Post, url)
        }
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }
}
