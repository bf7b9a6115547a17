//! Shell-like tokenizer for command text.
//!
//! Handles single quotes (literal), double quotes (with `\" \\ \$ \``
//! escapes), backslash escapes outside quotes, line continuations and
//! concatenation of adjacent quoted and unquoted segments.

/// One shell word after quote removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Text with quotes and escapes removed.
    pub text: String,
    /// Whether the word started inside quotes. Such words are never flags.
    pub leading_quoted: bool,
}

impl Token {
    /// Returns true if this token should be read as a flag.
    #[must_use]
    pub fn is_flag(&self) -> bool {
        !self.leading_quoted && self.text.len() > 1 && self.text.starts_with('-')
    }
}

/// Tokens plus problems found while lexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexed {
    /// Words in order.
    pub tokens: Vec<Token>,
    /// Non-fatal problems (e.g. unterminated quotes).
    pub warnings: Vec<String>,
}

/// Splits `input` into shell words.
#[must_use]
pub fn lex(input: &str) -> Lexed {
    let mut lexed = Lexed::default();
    let mut chars = input.chars().peekable();
    let mut current = String::new();
    // Some(leading_quoted) once the current word has started.
    let mut started: Option<bool> = None;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                // line continuation
                Some('\n') => {}
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                Some(escaped) => {
                    started.get_or_insert(false);
                    current.push(escaped);
                }
                None => {
                    started.get_or_insert(false);
                    current.push('\\');
                }
            },
            '\'' => {
                started.get_or_insert(true);
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '\'' {
                        closed = true;
                        break;
                    }
                    current.push(inner);
                }
                if !closed {
                    lexed.warnings.push("unterminated single quote".to_string());
                }
            }
            '"' => {
                started.get_or_insert(true);
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    match inner {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.peek().copied() {
                            Some(next @ ('"' | '\\' | '$' | '`')) => {
                                chars.next();
                                current.push(next);
                            }
                            Some('\n') => {
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        other => current.push(other),
                    }
                }
                if !closed {
                    lexed.warnings.push("unterminated double quote".to_string());
                }
            }
            c if c.is_whitespace() => {
                if let Some(leading_quoted) = started.take() {
                    lexed.tokens.push(Token {
                        text: std::mem::take(&mut current),
                        leading_quoted,
                    });
                }
            }
            other => {
                started.get_or_insert(false);
                current.push(other);
            }
        }
    }

    if let Some(leading_quoted) = started {
        lexed.tokens.push(Token {
            text: current,
            leading_quoted,
        });
    }

    lexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(input: &str) -> Vec<String> {
        lex(input).tokens.into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(texts("curl  -s\thttps://x.io"), vec!["curl", "-s", "https://x.io"]);
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(texts(r"'a \n $b'"), vec![r"a \n $b"]);
    }

    #[test]
    fn test_double_quote_escapes() {
        assert_eq!(texts(r#""say \"hi\" \$HOME \x""#), vec![r#"say "hi" $HOME \x"#]);
    }

    #[test]
    fn test_adjacent_segments_concatenate() {
        assert_eq!(texts(r#"ab'c d'"e"f"#), vec!["abc def"]);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            texts("curl \\\n  -H 'A: b' \\\r\n  https://x.io"),
            vec!["curl", "-H", "A: b", "https://x.io"]
        );
    }

    #[test]
    fn test_empty_quotes_make_a_token() {
        assert_eq!(texts("-d ''"), vec!["-d", ""]);
    }

    #[test]
    fn test_unterminated_quote_warns() {
        let lexed = lex("curl 'https://x.io");
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!(lexed.tokens[1].text, "https://x.io");
        assert_eq!(lexed.warnings, vec!["unterminated single quote".to_string()]);
    }

    #[test]
    fn test_quoted_dash_is_not_a_flag() {
        let lexed = lex("-d '-x'");
        assert!(lexed.tokens[0].is_flag());
        assert!(!lexed.tokens[1].is_flag());
    }
}
