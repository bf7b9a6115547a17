//! Sensitive field sanitizer
//!
//! Classifies field names that carry secrets and masks their values in
//! structured data, header lists and free text. Inputs are never mutated;
//! every function returns a sanitized copy.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tether_domain::{EngineSettings, HandshakeExecutionResult, Headers, LogEntry};

/// Replacement for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Replacement for subtrees below the depth limit.
pub const MAX_DEPTH_EXCEEDED: &str = "[MAX_DEPTH_EXCEEDED]";

/// Default recursion limit for [`Sanitizer::sanitize_value`].
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Names that are sensitive only when they match completely.
const EXACT: &[&str] = &["auth", "key", "pin", "pwd", "pass", "otp", "sig", "code", "jwt"];

/// Fragments that make any name containing them sensitive.
const SUBSTRINGS: &[&str] = &[
    "password",
    "passwd",
    "passphrase",
    "secret",
    "token",
    "apikey",
    "authorization",
    "credential",
    "privatekey",
    "cookie",
    "session",
    "signature",
    "ssn",
    "creditcard",
    "cardnumber",
    "cvv",
];

/// Last words that make a compound name sensitive (`myApiKey`, `db_pwd`).
const SUFFIXES: &[&str] = &["key", "pwd", "pass", "secret", "token", "sig", "pin", "verifier"];

#[allow(clippy::expect_used)]
static URL_USERINFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9+.-]*://)[^/\s:@]+:[^/\s@]+@").expect("valid regex")
});

#[allow(clippy::expect_used)]
static AUTH_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(basic|bearer)\s+[A-Za-z0-9\-._~+/]+=*").expect("valid regex")
});

/// A `name=value` pair at the start of a query or form string.
#[allow(clippy::expect_used)]
static QUERY_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[?&])([^=&?#\s]+)=([^&#\s]+)").expect("valid regex")
});

/// Lower-cases a name and drops separators (`X-Api_Key` -> `xapikey`).
fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Returns the last word of a camelCase or separated name, lower-cased.
fn last_word(name: &str) -> String {
    let trimmed = name.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    let mut start = 0;
    let mut prev_lower = false;
    for (index, c) in trimmed.char_indices() {
        if !c.is_ascii_alphanumeric() {
            start = index + c.len_utf8();
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower {
            start = index;
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    trimmed[start..].to_ascii_lowercase()
}

/// Masks secrets in structured and textual data.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    extra: Vec<String>,
    max_depth: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_MAX_DEPTH)
    }
}

impl Sanitizer {
    /// Creates a sanitizer with extra sensitive names on top of the built-in list.
    #[must_use]
    pub fn new(extra: impl IntoIterator<Item = String>, max_depth: usize) -> Self {
        Self {
            extra: extra
                .into_iter()
                .map(|name| normalize(&name))
                .filter(|name| !name.is_empty())
                .collect(),
            max_depth,
        }
    }

    /// Creates a sanitizer from engine settings.
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            settings.sensitive_fields.iter().cloned(),
            settings.sanitizer_max_depth,
        )
    }

    /// Returns true if values stored under `name` must be masked.
    ///
    /// Matching is case-insensitive and ignores `-`, `_` and `.`: a name is
    /// sensitive when it equals a short marker (`pin`), contains a known
    /// fragment (`client_secret`) or ends in a sensitive word (`myApiKey`).
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return false;
        }
        EXACT.contains(&normalized.as_str())
            || SUBSTRINGS.iter().any(|s| normalized.contains(s))
            || self.extra.iter().any(|s| normalized.contains(s.as_str()))
            || SUFFIXES.contains(&last_word(name).as_str())
    }

    /// Returns a deep copy of `value` with sensitive fields masked.
    #[must_use]
    pub fn sanitize_value(&self, value: &Value) -> Value {
        self.sanitize_at(value, 0)
    }

    fn sanitize_at(&self, value: &Value, depth: usize) -> Value {
        if depth > self.max_depth {
            return Value::String(MAX_DEPTH_EXCEEDED.to_string());
        }
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, child)| {
                        let masked = if self.is_sensitive(key) && !is_blank(child) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.sanitize_at(child, depth + 1)
                        };
                        (key.clone(), masked)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.sanitize_at(item, depth + 1))
                    .collect(),
            ),
            Value::String(text) => Value::String(self.sanitize_text(text)),
            other => other.clone(),
        }
    }

    /// Returns a copy of `headers` with secret-bearing values masked.
    #[must_use]
    pub fn sanitize_headers(&self, headers: &Headers) -> Headers {
        headers
            .iter()
            .map(|h| (h.name.clone(), self.sanitize_header_value(&h.name, &h.value)))
            .collect()
    }

    /// Returns a copy of a response header map with secret-bearing values masked.
    #[must_use]
    pub fn sanitize_header_map(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| (name.clone(), self.sanitize_header_value(name, value)))
            .collect()
    }

    fn sanitize_header_value(&self, name: &str, value: &str) -> String {
        if value.is_empty() {
            String::new()
        } else if self.is_sensitive(name) {
            REDACTED.to_string()
        } else {
            self.sanitize_text(value)
        }
    }

    /// Masks URL userinfo, `Basic`/`Bearer` credentials and query or form
    /// parameters whose name is sensitive.
    #[must_use]
    pub fn sanitize_text(&self, text: &str) -> String {
        let masked = URL_USERINFO.replace_all(text, "${1}[REDACTED]@");
        let masked = AUTH_SCHEME.replace_all(&masked, "${1} [REDACTED]");
        QUERY_PAIR
            .replace_all(&masked, |caps: &Captures<'_>| {
                if self.is_sensitive(&caps[2]) {
                    format!("{}{}={REDACTED}", &caps[1], &caps[2])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    /// Returns a copy of `result` safe to log, emit or persist.
    ///
    /// Headers, bodies, attempt logs and the error message are masked. A JSON
    /// body is re-serialized only when masking changed it.
    #[must_use]
    pub fn sanitize_result(&self, result: &HandshakeExecutionResult) -> HandshakeExecutionResult {
        let mut clean = result.clone();
        clean.headers = self.sanitize_header_map(&result.headers);
        clean.body = match serde_json::from_str::<Value>(&result.body) {
            Ok(raw) => {
                let masked = self.sanitize_value(&raw);
                if masked == raw {
                    result.body.clone()
                } else {
                    masked.to_string()
                }
            }
            Err(_) => self.sanitize_text(&result.body),
        };
        clean.body_json = result.body_json.as_ref().map(|value| self.sanitize_value(value));
        clean.logs = result
            .logs
            .iter()
            .map(|entry| LogEntry {
                message: self.sanitize_text(&entry.message),
                ..entry.clone()
            })
            .collect();
        if let Some(error) = &mut clean.error {
            error.message = self.sanitize_text(&error.message);
            error.details = error.details.as_deref().map(|d| self.sanitize_text(d));
        }
        clean
    }
}

/// Empty strings and nulls carry nothing worth hiding.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Returns true if `name` is sensitive under the built-in list.
#[must_use]
pub fn is_sensitive(name: &str) -> bool {
    Sanitizer::default().is_sensitive(name)
}

/// Masks secrets in free text using the built-in list.
///
/// See [`Sanitizer::sanitize_text`].
#[must_use]
pub fn sanitize_string(text: &str) -> String {
    Sanitizer::default().sanitize_text(text)
}
