//! File-backed persistence.

mod definitions;
mod file_repository;
mod settings_repository;

pub use definitions::load_handshake;
pub use file_repository::{JsonFileRepository, RepositoryError};
pub use settings_repository::{
    ENV_PREFIX, SETTINGS_FILE, SettingsError, SettingsRepository, apply_env_overrides,
};
