//! Tether Domain - Core business types
//!
//! This crate defines the domain model for the Tether handshake engine.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod catalog;
pub mod command;
pub mod error;
pub mod execution;
pub mod handshake;
pub mod id;
pub mod placeholder;
pub mod request;
pub mod response;
pub mod run;
pub mod secret;
pub mod settings;

pub use auth::{
    AccessToken, ApiKeyLocation, AuthError, AuthenticationConfig, ClientAuthMethod,
    CredentialMaterial, Credentials, ProtocolType, RefreshMetadata, SoapVersion,
};
pub use command::{CommandFlags, ParsedCommand};
pub use error::{DomainError, DomainResult};
pub use execution::{
    ErrorCode, ExecutionError, HandshakeExecutionResult, LogEntry, LogLevel, RetryMetadata,
    TimingMetrics,
};
pub use handshake::{Handshake, ProtocolPayload, RequestSpec, RequestTemplate, RetryPolicyConfig};
pub use id::{HandshakeId, RunId};
pub use placeholder::{Placeholder, PlaceholderKind};
pub use request::{Header, Headers, HttpMethod, RequestOptions};
pub use response::{StatusCategory, StatusCode};
pub use run::{ExecutionRun, HealthIndicator, RunState};
pub use secret::Secret;
pub use settings::EngineSettings;
