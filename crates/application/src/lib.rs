//! Tether Application - Handshake execution core
//!
//! This crate holds everything between the domain model and the outside
//! world: command parsing, placeholder resolution, secret sanitizing, the
//! protocol strategies and the execution engine. I/O happens only through
//! the traits in [`ports`].

pub mod command;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod placeholder;
pub mod ports;
pub mod protocols;
pub mod registry;
pub mod sanitizer;

pub use command::{CommandError, parse, stringify, to_request_options, validate};
pub use engine::{
    CancelHandle, ChannelObserver, ExecutionEvent, ExecutionObserver, HandshakeExecutor,
    NoopObserver, RetryPolicy, RunInputs,
};
pub use error::{ApplicationError, ApplicationResult, RegistryError};
pub use lifecycle::ExecutionTracker;
pub use placeholder::{PlaceholderError, PlaceholderResolver, ResolutionContext, ResolutionResult};
pub use protocols::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, TokenCache};
pub use registry::{ProtocolRegistry, StrategyFactory};
pub use sanitizer::{Sanitizer, is_sensitive, sanitize_string};
