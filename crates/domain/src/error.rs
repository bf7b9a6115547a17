//! Domain error types

use thiserror::Error;

/// Errors raised by domain types when parsing or changing state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The protocol identifier is not part of the known set.
    #[error("unknown protocol type: {0}")]
    UnknownProtocol(String),

    /// A run was asked to move to a state it cannot reach.
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// An identifier is invalid or empty.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
