//! Parsed cURL-like command types.

use serde::{Deserialize, Serialize};

use crate::request::Headers;

/// Boolean switches recognised in command text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CommandFlags {
    /// `-L` / `--location`
    pub follow_redirects: bool,
    /// `-v` / `--verbose`
    pub verbose: bool,
    /// `-k` / `--insecure`
    pub insecure: bool,
    /// `-I` / `--head`
    pub head_only: bool,
    /// `--compressed`
    pub compressed: bool,
    /// `-s` / `--silent`
    pub silent: bool,
    /// `-i` / `--include`
    pub include: bool,
    /// `-G` / `--get`
    pub get_mode: bool,
}

/// Structured form of one cURL-like command.
///
/// Always re-derived from source text; never cached across edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Upper-cased method text. Kept raw so validation can report unsupported methods.
    pub method: String,
    /// Whether the method came from `-X`/`--request`/`-I` rather than the default.
    pub method_explicit: bool,
    /// Target URL, if one was found.
    pub url: Option<String>,
    /// Ordered headers; names are unique case-insensitively.
    pub headers: Headers,
    /// Request body assembled from data flags.
    pub body: Option<String>,
    /// Multipart form fields (`-F name=value`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form: Vec<String>,
    /// `user:password` from `-u`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// `--max-time` in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_secs: Option<f64>,
    /// `--connect-timeout` in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<f64>,
    /// Boolean switches.
    #[serde(default)]
    pub flags: CommandFlags,
    /// Non-fatal problems found while parsing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ParsedCommand {
    /// Returns true if the semantically relevant parts (method, URL, headers, body) match.
    #[must_use]
    pub fn semantically_eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.url == other.url
            && self.headers == other.headers
            && self.body == other.body
    }

    /// Returns true if nothing usable was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.headers.is_empty() && self.body.is_none()
    }
}
