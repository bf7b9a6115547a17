//! cURL-like command parser.

use std::iter::Peekable;
use std::vec::IntoIter;

use tether_domain::{CommandFlags, Headers, ParsedCommand};

use super::flags::{CommandOption, DataKind};
use super::lexer::{Token, lex};

/// Collected state while walking the tokens.
#[derive(Default)]
struct Builder {
    method: Option<String>,
    url: Option<String>,
    bare: Vec<String>,
    headers: Headers,
    data: Vec<String>,
    json: bool,
    form: Vec<String>,
    user: Option<String>,
    max_time_secs: Option<f64>,
    connect_timeout_secs: Option<f64>,
    flags: CommandFlags,
    warnings: Vec<String>,
}

/// Parses command text into a [`ParsedCommand`].
///
/// Never fails: problems are reported in `warnings` and left for
/// [`validate`](super::validate) to judge.
#[must_use]
pub fn parse(input: &str) -> ParsedCommand {
    let lexed = lex(input);
    let mut builder = Builder {
        warnings: lexed.warnings,
        ..Builder::default()
    };

    let mut tokens = lexed.tokens.into_iter().peekable();
    if tokens
        .peek()
        .is_some_and(|t| !t.leading_quoted && t.text.eq_ignore_ascii_case("curl"))
    {
        tokens.next();
    }

    while let Some(token) = tokens.next() {
        if !token.is_flag() {
            builder.positional(token.text);
            continue;
        }

        if let Some(long) = token.text.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (long, None),
            };
            match CommandOption::from_long(name) {
                Some(option) if option.takes_value() => {
                    match inline.or_else(|| next_value(&mut tokens)) {
                        Some(value) => builder.apply_value(option, value),
                        None => builder.missing_value(&token.text),
                    }
                }
                Some(option) => builder.apply_switch(option),
                None => builder.warnings.push(format!("ignored unknown flag {}", token.text)),
            }
            continue;
        }

        // Short flags: clustered switches (-sL) or an attached value (-XPOST).
        let cluster: Vec<char> = token.text.chars().skip(1).collect();
        for (index, flag) in cluster.iter().enumerate() {
            let Some(option) = CommandOption::from_short(*flag) else {
                builder.warnings.push(format!("ignored unknown flag -{flag}"));
                break;
            };
            if option.takes_value() {
                let attached: String = cluster[index + 1..].iter().collect();
                let value = if attached.is_empty() {
                    next_value(&mut tokens)
                } else {
                    Some(attached)
                };
                match value {
                    Some(value) => builder.apply_value(option, value),
                    None => builder.missing_value(&format!("-{flag}")),
                }
                break;
            }
            builder.apply_switch(option);
        }
    }

    builder.finish()
}

/// Takes the next token if it is not a flag.
fn next_value(tokens: &mut Peekable<IntoIter<Token>>) -> Option<String> {
    tokens.next_if(|t| !t.is_flag()).map(|t| t.text)
}

fn looks_like_url(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl Builder {
    fn positional(&mut self, text: String) {
        if looks_like_url(&text) {
            if self.url.is_none() {
                self.url = Some(text);
            } else {
                self.warnings.push(format!("ignored extra URL {text}"));
            }
        } else {
            self.bare.push(text);
        }
    }

    fn missing_value(&mut self, flag: &str) {
        self.warnings.push(format!("flag {flag} is missing its value"));
    }

    fn apply_switch(&mut self, option: CommandOption) {
        let flags = &mut self.flags;
        match option {
            CommandOption::Location => flags.follow_redirects = true,
            CommandOption::Verbose => flags.verbose = true,
            CommandOption::Insecure => flags.insecure = true,
            CommandOption::Head => flags.head_only = true,
            CommandOption::Silent => flags.silent = true,
            CommandOption::Compressed => flags.compressed = true,
            CommandOption::Include => flags.include = true,
            CommandOption::Get => flags.get_mode = true,
            _ => {}
        }
    }

    fn apply_value(&mut self, option: CommandOption, value: String) {
        match option {
            CommandOption::Request => self.method = Some(value.trim().to_ascii_uppercase()),
            CommandOption::Header => match value.split_once(':') {
                Some((name, header_value)) if !name.trim().is_empty() => {
                    self.headers.set(name.trim(), header_value.trim());
                }
                _ => self.warnings.push(format!("dropped malformed header {value:?}")),
            },
            CommandOption::Data(DataKind::Raw) => self.data.push(value),
            CommandOption::Data(DataKind::Json) => {
                self.json = true;
                self.data.push(value);
            }
            CommandOption::Data(DataKind::UrlEncode) => {
                let encoded = match value.split_once('=') {
                    Some(("", content)) => url_encode(content),
                    Some((name, content)) => format!("{name}={}", url_encode(content)),
                    None => url_encode(&value),
                };
                self.data.push(encoded);
            }
            CommandOption::Form => self.form.push(value),
            CommandOption::User => self.user = Some(value),
            CommandOption::UserAgent => self.headers.set("User-Agent", value),
            CommandOption::Referer => self.headers.set("Referer", value),
            CommandOption::Cookie => self.headers.set("Cookie", value),
            CommandOption::MaxTime => self.max_time_secs = self.seconds("--max-time", &value),
            CommandOption::ConnectTimeout => {
                self.connect_timeout_secs = self.seconds("--connect-timeout", &value);
            }
            CommandOption::Url => self.url = Some(value),
            switch => self.apply_switch(switch),
        }
    }

    fn seconds(&mut self, flag: &str, value: &str) -> Option<f64> {
        match value.trim().parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => Some(secs),
            _ => {
                self.warnings.push(format!("ignored invalid {flag} value {value:?}"));
                None
            }
        }
    }

    fn finish(mut self) -> ParsedCommand {
        let mut url = self.url.take();
        let mut bare = self.bare.into_iter();
        if url.is_none() {
            url = bare.next();
        }
        for extra in bare {
            self.warnings.push(format!("ignored extra argument {extra:?}"));
        }

        let mut body = if self.data.is_empty() {
            None
        } else {
            Some(self.data.join("&"))
        };

        if self.json {
            self.headers.set_if_absent("Content-Type", "application/json");
            self.headers.set_if_absent("Accept", "application/json");
        }

        let method_explicit = self.method.is_some() || self.flags.head_only;
        let method = if let Some(method) = self.method {
            method
        } else if self.flags.head_only {
            "HEAD".to_string()
        } else if self.flags.get_mode {
            "GET".to_string()
        } else if body.is_some() || !self.form.is_empty() {
            "POST".to_string()
        } else {
            "GET".to_string()
        };

        if self.flags.get_mode {
            if let (Some(query), Some(target)) = (body.take(), url.as_mut()) {
                let separator = if target.contains('?') { '&' } else { '?' };
                target.push(separator);
                target.push_str(&query);
            }
        }

        ParsedCommand {
            method,
            method_explicit,
            url,
            headers: self.headers,
            body,
            form: self.form,
            user: self.user,
            max_time_secs: self.max_time_secs,
            connect_timeout_secs: self.connect_timeout_secs,
            flags: self.flags,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_post_with_header_and_body() {
        let cmd = parse(
            r#"curl -X POST 'https://api.example.com/items' -H 'K: V' -d '{"a":1}'"#,
        );
        assert_eq!(cmd.method, "POST");
        assert!(cmd.method_explicit);
        assert_eq!(cmd.url.as_deref(), Some("https://api.example.com/items"));
        assert_eq!(cmd.headers.to_pairs(), vec![("K".to_string(), "V".to_string())]);
        assert_eq!(cmd.body.as_deref(), Some(r#"{"a":1}"#));
        assert!(cmd.warnings.is_empty());
    }

    #[test]
    fn test_body_promotes_to_post() {
        let cmd = parse("curl https://x.io -d a=1 -d b=2");
        assert_eq!(cmd.method, "POST");
        assert!(!cmd.method_explicit);
        assert_eq!(cmd.body.as_deref(), Some("a=1&b=2"));
    }

    #[test]
    fn test_explicit_method_is_kept_with_body() {
        let cmd = parse("curl -X put https://x.io -d a=1");
        assert_eq!(cmd.method, "PUT");
    }

    #[test]
    fn test_head_flag_implies_head() {
        let cmd = parse("curl -I https://x.io");
        assert_eq!(cmd.method, "HEAD");
        assert!(cmd.flags.head_only);
    }

    #[test]
    fn test_get_mode_moves_data_to_query() {
        let cmd = parse("curl -G https://x.io/search?lang=en -d q=rust");
        assert_eq!(cmd.method, "GET");
        assert_eq!(cmd.url.as_deref(), Some("https://x.io/search?lang=en&q=rust"));
        assert!(cmd.body.is_none());
    }

    #[test]
    fn test_long_equals_and_attached_short_values() {
        let cmd = parse("curl --request=DELETE -HAccept:text/plain --url=https://x.io/1");
        assert_eq!(cmd.method, "DELETE");
        assert_eq!(cmd.headers.get("accept"), Some("text/plain"));
        assert_eq!(cmd.url.as_deref(), Some("https://x.io/1"));
    }

    #[test]
    fn test_clustered_switches() {
        let cmd = parse("curl -sLk https://x.io");
        assert!(cmd.flags.silent);
        assert!(cmd.flags.follow_redirects);
        assert!(cmd.flags.insecure);
    }

    #[test]
    fn test_header_split_on_first_colon() {
        let cmd = parse("curl https://x.io -H 'X-Time: 12:30:00'");
        assert_eq!(cmd.headers.get("X-Time"), Some("12:30:00"));
    }

    #[test]
    fn test_malformed_header_dropped_with_warning() {
        let cmd = parse("curl https://x.io -H 'NoColonHere'");
        assert!(cmd.headers.is_empty());
        assert_eq!(cmd.warnings.len(), 1);
    }

    #[test]
    fn test_repeated_header_replaces_in_place() {
        let cmd = parse("curl https://x.io -H 'A: 1' -H 'B: 2' -H 'a: 3'");
        assert_eq!(
            cmd.headers.to_pairs(),
            vec![
                ("A".to_string(), "3".to_string()),
                ("B".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_first_bare_value_becomes_url() {
        let cmd = parse("curl example.com/health");
        assert_eq!(cmd.url.as_deref(), Some("example.com/health"));
    }

    #[test]
    fn test_unknown_flags_are_ignored() {
        let cmd = parse("curl --retry-connrefused https://x.io");
        assert_eq!(cmd.url.as_deref(), Some("https://x.io"));
        assert_eq!(cmd.warnings.len(), 1);
    }

    #[test]
    fn test_data_urlencode() {
        let cmd = parse("curl https://x.io --data-urlencode 'q=a b&c'");
        assert_eq!(cmd.body.as_deref(), Some("q=a+b%26c"));
    }

    #[test]
    fn test_json_flag_sets_content_type() {
        let cmd = parse(r#"curl https://x.io --json '{"a":1}'"#);
        assert_eq!(cmd.method, "POST");
        assert_eq!(cmd.headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn test_user_agent_and_cookie_become_headers() {
        let cmd = parse("curl https://x.io -A tether -b 'sid=1'");
        assert_eq!(cmd.headers.get("User-Agent"), Some("tether"));
        assert_eq!(cmd.headers.get("Cookie"), Some("sid=1"));
    }

    #[test]
    fn test_timeouts() {
        let cmd = parse("curl https://x.io -m 2.5 --connect-timeout nope");
        assert_eq!(cmd.max_time_secs, Some(2.5));
        assert_eq!(cmd.connect_timeout_secs, None);
        assert_eq!(cmd.warnings.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let cmd = parse("   ");
        assert!(cmd.is_empty());
        assert_eq!(cmd.method, "GET");
    }
}
