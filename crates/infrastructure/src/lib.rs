//! Tether Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus settings and definition loading.

pub mod adapters;
pub mod persistence;
pub mod serialization;
pub mod telemetry;

pub use adapters::{ReqwestTransport, SystemClock};
pub use persistence::{
    JsonFileRepository, RepositoryError, SettingsError, SettingsRepository, apply_env_overrides,
    load_handshake,
};
pub use serialization::{
    DefinitionFormat, SerializationError, from_definition, from_json, from_json_bytes,
    to_json_stable, to_json_stable_bytes,
};
pub use telemetry::init_tracing;
