//! Application error types

use tether_domain::{AuthError, DomainError, ProtocolType};
use thiserror::Error;

use crate::command::CommandError;
use crate::placeholder::PlaceholderError;
use crate::ports::TransportError;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Command text could not be turned into a request.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Placeholder resolution failed.
    #[error("placeholder error: {0}")]
    Placeholder(#[from] PlaceholderError),

    /// Authentication failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No strategy is registered for the protocol.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Protocol registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The identifier does not name a known protocol.
    #[error("unknown protocol type: {0}")]
    UnknownProtocol(String),

    /// The protocol is known but has no registered factory.
    #[error("unknown protocol type: {0} (no handler registered)")]
    NotRegistered(ProtocolType),
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
