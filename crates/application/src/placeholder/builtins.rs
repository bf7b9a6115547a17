//! Computed placeholders and encoding transforms
//!
//! Dynamic values are produced at resolution time; encoders transform the
//! inline argument of `{BASE64:...}`, `{URL_ENCODE:...}` and `{JSON:...}`.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::crypto;

/// Default length of `{RANDOM}`.
pub const DEFAULT_RANDOM_LENGTH: usize = 16;

/// Upper bound for `{RANDOM:n}`.
pub const MAX_RANDOM_LENGTH: usize = 4096;

/// Information about a built-in placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinInfo {
    /// Placeholder as written
    pub syntax: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Example output
    pub example: &'static str,
}

/// Generates values for computed placeholders.
pub struct DynamicPlaceholders;

impl DynamicPlaceholders {
    /// Computes the value for `name` with an optional argument.
    ///
    /// Returns `None` for unknown names and unusable arguments.
    #[must_use]
    pub fn compute(name: &str, argument: Option<&str>, now: DateTime<Utc>) -> Option<String> {
        match name {
            "TIMESTAMP" => Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "UNIX_TIMESTAMP" => match argument {
                None => Some(now.timestamp().to_string()),
                Some("ms") => Some(now.timestamp_millis().to_string()),
                Some(_) => None,
            },
            "DATE" => Self::format(now, argument.unwrap_or("%Y-%m-%d")),
            "TIME" => Self::format(now, argument.unwrap_or("%H:%M:%S")),
            "UUID" => Some(Uuid::new_v4().to_string()),
            "RANDOM" => {
                let len = match argument {
                    None => DEFAULT_RANDOM_LENGTH,
                    Some(arg) => arg.trim().parse().ok()?,
                };
                (len <= MAX_RANDOM_LENGTH).then(|| crypto::random_alphanumeric(len))
            }
            _ => None,
        }
    }

    /// Formats `now` with a strftime pattern; invalid patterns yield `None`.
    fn format(now: DateTime<Utc>, pattern: &str) -> Option<String> {
        let mut out = String::new();
        write!(out, "{}", now.format(pattern)).ok()?;
        Some(out)
    }

    /// Returns every built-in placeholder with a description.
    #[must_use]
    pub fn available() -> Vec<BuiltinInfo> {
        vec![
            BuiltinInfo {
                syntax: "{INPUT}",
                description: "Literal input supplied with the run",
                example: "hello",
            },
            BuiltinInfo {
                syntax: "{TIMESTAMP}",
                description: "ISO 8601 timestamp (UTC, milliseconds)",
                example: "2024-01-26T12:00:00.000Z",
            },
            BuiltinInfo {
                syntax: "{UNIX_TIMESTAMP[:ms]}",
                description: "Unix timestamp in seconds, or milliseconds with :ms",
                example: "1706270400",
            },
            BuiltinInfo {
                syntax: "{DATE[:format]}",
                description: "Current date, strftime format (default %Y-%m-%d)",
                example: "2024-01-26",
            },
            BuiltinInfo {
                syntax: "{TIME[:format]}",
                description: "Current time, strftime format (default %H:%M:%S)",
                example: "12:00:00",
            },
            BuiltinInfo {
                syntax: "{UUID}",
                description: "Random UUID v4",
                example: "550e8400-e29b-41d4-a716-446655440000",
            },
            BuiltinInfo {
                syntax: "{RANDOM[:len]}",
                description: "Random alphanumeric string (default 16 chars)",
                example: "aB3dE5fG7hI9jK1m",
            },
            BuiltinInfo {
                syntax: "{ENV:NAME}",
                description: "Environment variable",
                example: "/home/user",
            },
            BuiltinInfo {
                syntax: "{BASE64:text}",
                description: "Standard base64 of the argument",
                example: "aGVsbG8=",
            },
            BuiltinInfo {
                syntax: "{URL_ENCODE:text}",
                description: "Percent-encoded argument",
                example: "a%20b%26c",
            },
            BuiltinInfo {
                syntax: "{JSON:text}",
                description: "Argument escaped for use inside a JSON string",
                example: r#"say \"hi\""#,
            },
        ]
    }
}

/// Applies an encoding transform to `argument`.
#[must_use]
pub fn encode(name: &str, argument: &str) -> Option<String> {
    match name {
        "BASE64" => Some(crypto::base64_encode(argument.as_bytes())),
        "URL_ENCODE" => Some(
            url::form_urlencoded::byte_serialize(argument.as_bytes())
                .collect::<String>()
                .replace('+', "%20"),
        ),
        "JSON" => {
            let quoted = serde_json::to_string(argument).ok()?;
            Some(quoted[1..quoted.len() - 1].to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 26, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_time_values() {
        let now = fixed_now();
        assert_eq!(
            DynamicPlaceholders::compute("TIMESTAMP", None, now).unwrap(),
            "2024-01-26T12:30:45.000Z"
        );
        assert_eq!(
            DynamicPlaceholders::compute("UNIX_TIMESTAMP", None, now).unwrap(),
            "1706272245"
        );
        assert_eq!(DynamicPlaceholders::compute("DATE", None, now).unwrap(), "2024-01-26");
        assert_eq!(DynamicPlaceholders::compute("TIME", None, now).unwrap(), "12:30:45");
        assert_eq!(
            DynamicPlaceholders::compute("DATE", Some("%d/%m/%Y"), now).unwrap(),
            "26/01/2024"
        );
    }

    #[test]
    fn test_invalid_date_format_is_unresolvable() {
        assert!(DynamicPlaceholders::compute("DATE", Some("%Q"), fixed_now()).is_none());
    }

    #[test]
    fn test_random_length() {
        let now = fixed_now();
        assert_eq!(DynamicPlaceholders::compute("RANDOM", None, now).unwrap().len(), 16);
        assert_eq!(DynamicPlaceholders::compute("RANDOM", Some("8"), now).unwrap().len(), 8);
        assert!(DynamicPlaceholders::compute("RANDOM", Some("lots"), now).is_none());
    }

    #[test]
    fn test_encoders() {
        assert_eq!(encode("BASE64", "hello").unwrap(), "aGVsbG8=");
        assert_eq!(encode("URL_ENCODE", "a b&c").unwrap(), "a%20b%26c");
        assert_eq!(encode("JSON", "say \"hi\"\n").unwrap(), r#"say \"hi\"\n"#);
        assert!(encode("ROT13", "x").is_none());
    }
}
