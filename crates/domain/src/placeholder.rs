//! Placeholder tokens embedded in command text.
//!
//! Syntax is `{NAME}` or `{NAME:argument}`.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Name of the literal input placeholder.
pub const INPUT: &str = "INPUT";

/// Name of the environment lookup placeholder (`{ENV:VAR}`).
pub const ENV: &str = "ENV";

/// Names of computed placeholders.
pub const DYNAMIC_NAMES: &[&str] = &["TIMESTAMP", "UNIX_TIMESTAMP", "DATE", "TIME", "UUID", "RANDOM"];

/// Names of encoding transforms.
pub const ENCODING_NAMES: &[&str] = &["BASE64", "URL_ENCODE", "JSON"];

/// What a placeholder resolves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// `{INPUT}`, the caller-supplied literal.
    LiteralInput,
    /// Computed at resolution time (`{UUID}`, `{TIMESTAMP}`, ...).
    ComputedDynamic,
    /// `{ENV:VAR}`.
    EnvironmentLookup,
    /// Any other name, looked up in the user variables.
    UserVariable,
    /// `{BASE64:text}`, `{URL_ENCODE:text}`, `{JSON:text}`.
    EncodingTransform,
}

impl PlaceholderKind {
    /// Classifies a placeholder name.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        if name == INPUT {
            Self::LiteralInput
        } else if name == ENV {
            Self::EnvironmentLookup
        } else if DYNAMIC_NAMES.contains(&name) {
            Self::ComputedDynamic
        } else if ENCODING_NAMES.contains(&name) {
            Self::EncodingTransform
        } else {
            Self::UserVariable
        }
    }

    /// Returns the identifier used in errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiteralInput => "literal-input",
            Self::ComputedDynamic => "computed-dynamic",
            Self::EnvironmentLookup => "environment-lookup",
            Self::UserVariable => "user-variable",
            Self::EncodingTransform => "encoding-transform",
        }
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One placeholder occurrence in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    /// Placeholder name without braces or argument.
    pub name: String,
    /// Text after the first colon, if any.
    pub argument: Option<String>,
    /// Classification of `name`.
    pub kind: PlaceholderKind,
    /// Byte range of the occurrence in the template.
    pub span: Range<usize>,
    /// The occurrence as written, braces included.
    pub raw: String,
}

impl Placeholder {
    /// Creates an occurrence, classifying the name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        argument: Option<String>,
        span: Range<usize>,
        raw: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let kind = PlaceholderKind::classify(&name);
        Self {
            name,
            argument,
            kind,
            span,
            raw: raw.into(),
        }
    }

    /// Returns the name reported in resolved/unresolved lists.
    ///
    /// Environment lookups report `ENV:VAR` so different variables stay distinct.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.kind, &self.argument) {
            (PlaceholderKind::EnvironmentLookup, Some(arg)) => format!("{ENV}:{arg}"),
            _ => self.name.clone(),
        }
    }
}
