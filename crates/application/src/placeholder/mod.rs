//! Placeholder resolution module
//!
//! Parses and resolves `{NAME}` / `{NAME:argument}` placeholders in command
//! text.
//!
//! # Usage
//!
//! ```
//! use tether_application::placeholder::{PlaceholderResolver, ResolutionContext};
//!
//! let context = ResolutionContext::new().with_input("user:pass");
//! let result = PlaceholderResolver::new()
//!     .resolve("Authorization: Basic {BASE64:{INPUT}}", &context)
//!     .unwrap();
//! assert_eq!(result.output, "Authorization: Basic dXNlcjpwYXNz");
//! ```

pub mod builtins;
pub mod engine;
pub mod parser;

use tether_domain::{ErrorCode, PlaceholderKind};
use thiserror::Error;

pub use builtins::{BuiltinInfo, DynamicPlaceholders, encode};
pub use engine::{EnvLookup, PlaceholderResolver, ResolutionContext, ResolutionResult};
pub use parser::{extract_placeholders, has_placeholders};

/// Placeholder resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    /// A placeholder had no value in strict mode.
    #[error("unresolved placeholder {{{name}}} ({kind})")]
    Unresolved {
        /// Reported name (`ENV:VAR` for environment lookups).
        name: String,
        /// Kind of the placeholder.
        kind: PlaceholderKind,
    },
}

impl PlaceholderError {
    /// Maps this error to the execution error taxonomy.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ParseError
    }
}
