//! Rendering parsed commands back to text and into transport requests.

use std::time::Duration;

use tether_domain::{HttpMethod, ParsedCommand, RequestOptions};

use super::CommandError;
use crate::crypto;

/// Quotes a value for a POSIX shell.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Renders a command as a single line of cURL text.
///
/// `parse(stringify(c))` is semantically equal to `c`.
#[must_use]
pub fn stringify(cmd: &ParsedCommand) -> String {
    render_parts(cmd).join(" ")
}

/// Renders a command with one option per line, joined by continuations.
#[must_use]
pub fn stringify_multiline(cmd: &ParsedCommand) -> String {
    render_parts(cmd).join(" \\\n  ")
}

fn render_parts(cmd: &ParsedCommand) -> Vec<String> {
    let mut parts = vec!["curl".to_string()];

    if cmd.method != "GET" || cmd.body.is_some() {
        parts.push(format!("-X {}", quote(&cmd.method)));
    }

    let switches = [
        (cmd.flags.follow_redirects, "-L"),
        (cmd.flags.insecure, "-k"),
        (cmd.flags.verbose, "-v"),
        (cmd.flags.silent, "-s"),
        (cmd.flags.include, "-i"),
        (cmd.flags.compressed, "--compressed"),
    ];
    parts.extend(
        switches
            .into_iter()
            .filter(|(on, _)| *on)
            .map(|(_, flag)| flag.to_string()),
    );

    if let Some(url) = &cmd.url {
        parts.push(quote(url));
    }

    for header in cmd.headers.iter() {
        parts.push(format!("-H {}", quote(&format!("{}: {}", header.name, header.value))));
    }

    if let Some(user) = &cmd.user {
        parts.push(format!("-u {}", quote(user)));
    }

    if let Some(body) = &cmd.body {
        parts.push(format!("--data-raw {}", quote(body)));
    }

    for field in &cmd.form {
        parts.push(format!("-F {}", quote(field)));
    }

    if let Some(secs) = cmd.max_time_secs {
        parts.push(format!("--max-time {secs}"));
    }

    if let Some(secs) = cmd.connect_timeout_secs {
        parts.push(format!("--connect-timeout {secs}"));
    }

    parts
}

/// Checks that a parsed command can be executed.
///
/// # Errors
///
/// Returns every problem found: [`CommandError::NoCommand`] for empty input,
/// [`CommandError::MissingUrl`] and [`CommandError::UnsupportedMethod`].
pub fn validate(cmd: &ParsedCommand) -> Result<(), Vec<CommandError>> {
    if cmd.is_empty() && cmd.form.is_empty() {
        return Err(vec![CommandError::NoCommand]);
    }

    let mut errors = Vec::new();
    if cmd.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
        errors.push(CommandError::MissingUrl);
    }
    if cmd.method.parse::<HttpMethod>().is_err() {
        errors.push(CommandError::UnsupportedMethod(cmd.method.clone()));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Converts a parsed command into transport-ready options.
///
/// `-u user:pass` becomes a Basic `Authorization` header unless one is
/// already present, and bodies without a `Content-Type` are sent as form
/// data, as cURL does.
///
/// # Errors
///
/// Returns the first validation error.
pub fn to_request_options(cmd: &ParsedCommand) -> Result<RequestOptions, CommandError> {
    if let Err(mut errors) = validate(cmd) {
        return Err(errors.remove(0));
    }

    let method: HttpMethod = cmd
        .method
        .parse()
        .map_err(|_| CommandError::UnsupportedMethod(cmd.method.clone()))?;
    let url = cmd.url.clone().ok_or(CommandError::MissingUrl)?;

    let mut headers = cmd.headers.clone();
    if let Some(user) = &cmd.user {
        let encoded = crypto::base64_encode(user.as_bytes());
        headers.set_if_absent("Authorization", format!("Basic {encoded}"));
    }
    if cmd.body.is_some() {
        headers.set_if_absent("Content-Type", "application/x-www-form-urlencoded");
    }
    if cmd.flags.compressed {
        headers.set_if_absent("Accept-Encoding", "gzip, deflate, br");
    }

    let timeout = cmd
        .max_time_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    Ok(RequestOptions {
        method,
        url,
        headers,
        body: cmd.body.clone(),
        follow_redirects: cmd.flags.follow_redirects,
        insecure: cmd.flags.insecure,
        timeout,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stringify_round_trip() {
        let inputs = [
            "curl https://x.io",
            r#"curl -X POST 'https://x.io/a?b=1&c=2' -H 'K: V' -d '{"it'\''s":1}'"#,
            "curl -I https://x.io",
            "curl -X DELETE https://x.io/1 -H 'Authorization: Bearer t' -L -k",
            "curl https://x.io -d 'a=1' -d 'b=2'",
        ];
        for input in inputs {
            let first = parse(input);
            let rendered = stringify(&first);
            let second = parse(&rendered);
            assert!(first.semantically_eq(&second), "{input} -> {rendered}");
        }
    }

    #[test]
    fn test_stringify_escapes_single_quotes() {
        let cmd = parse(r#"curl https://x.io -d "it's""#);
        assert!(stringify(&cmd).contains(r"'it'\''s'"));
    }

    #[test]
    fn test_multiline_uses_continuations() {
        let cmd = parse("curl https://x.io -H 'A: b'");
        assert_eq!(stringify_multiline(&cmd), "curl \\\n  'https://x.io' \\\n  -H 'A: b'");
    }

    #[test]
    fn test_validate_reports_errors() {
        assert_eq!(validate(&parse("")), Err(vec![CommandError::NoCommand]));
        assert_eq!(
            validate(&parse("curl -X FETCH -H 'A: b'")),
            Err(vec![
                CommandError::MissingUrl,
                CommandError::UnsupportedMethod("FETCH".to_string())
            ])
        );
        assert_eq!(validate(&parse("curl https://x.io")), Ok(()));
    }

    #[test]
    fn test_to_request_options() {
        let cmd = parse("curl -u alice:secret https://x.io -d a=1 -m 1.5 -L");
        let options = to_request_options(&cmd).unwrap();
        assert_eq!(options.method, HttpMethod::Post);
        assert_eq!(
            options.headers.get("Authorization"),
            Some("Basic YWxpY2U6c2VjcmV0")
        );
        assert_eq!(
            options.headers.get("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert!(options.follow_redirects);
    }
}
