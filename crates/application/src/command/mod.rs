//! Command parsing
//!
//! Turns cURL-like command text into a [`ParsedCommand`](tether_domain::ParsedCommand)
//! and back, and derives transport-ready request options from it.

mod flags;
mod lexer;
mod parser;
mod render;

use tether_domain::ErrorCode;
use thiserror::Error;

pub use lexer::{Lexed, Token, lex};
pub use parser::parse;
pub use render::{stringify, stringify_multiline, to_request_options, validate};

/// Problems that make a parsed command unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The input contained no command.
    #[error("no command supplied")]
    NoCommand,

    /// No URL was found.
    #[error("no URL found in command")]
    MissingUrl,

    /// The method is not one of the supported HTTP methods.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

impl CommandError {
    /// Maps this error to the execution error taxonomy.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NoCommand => ErrorCode::NoCommand,
            Self::MissingUrl | Self::UnsupportedMethod(_) => ErrorCode::ParseError,
        }
    }
}
