//! Engine settings persistence.
//!
//! Settings live in the platform-specific config directory unless an
//! explicit path is given:
//! - Linux: ~/.config/tether/settings.json
//! - macOS: ~/Library/Application Support/tether/settings.json
//! - Windows: %APPDATA%/tether/settings.json
//!
//! `TETHER_*` environment variables override whatever the file says.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tether_domain::EngineSettings;
use tokio::fs;

use crate::serialization::{SerializationError, from_json_bytes, to_json_stable_bytes};

/// File name of the settings file.
pub const SETTINGS_FILE: &str = "settings.json";

/// Prefix of the environment variables that override settings.
pub const ENV_PREFIX: &str = "TETHER_";

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Could not determine config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidOverride {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}

/// Loads and saves [`EngineSettings`].
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    path: Option<PathBuf>,
    explicit: bool,
}

impl Default for SettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsRepository {
    /// Uses the default location in the user's config directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
            explicit: false,
        }
    }

    /// Uses an explicit file, which must exist when loading.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            explicit: true,
        }
    }

    /// Default settings path, if a config directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tether").join(SETTINGS_FILE))
    }

    /// The file this repository reads and writes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads settings from disk.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(&self) -> Result<EngineSettings, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(EngineSettings::default());
        };

        match fs::read(path).await {
            Ok(content) => Ok(from_json_bytes(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.explicit {
                    Err(SettingsError::NotFound(path.clone()))
                } else {
                    tracing::debug!(path = %path.display(), "no settings file, using defaults");
                    Ok(EngineSettings::default())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads settings and applies `TETHER_*` overrides from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or an override is malformed.
    pub async fn load_with_env(&self) -> Result<EngineSettings, SettingsError> {
        let mut settings = self.load().await?;
        apply_env_overrides(&mut settings, |name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Saves settings to disk, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no location is known or the write fails.
    pub async fn save(&self, settings: &EngineSettings) -> Result<(), SettingsError> {
        let path = self.path.as_ref().ok_or(SettingsError::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, to_json_stable_bytes(settings)?).await?;
        Ok(())
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidOverride {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidOverride {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Applies `TETHER_*` overrides read through `lookup`.
///
/// `TETHER_SENSITIVE_FIELDS` is a comma-separated list added to the
/// configured fields; every other variable replaces its setting.
///
/// # Errors
///
/// Returns [`SettingsError::InvalidOverride`] for values that do not parse.
pub fn apply_env_overrides(
    settings: &mut EngineSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    let var = |key: &str| {
        let name = format!("{ENV_PREFIX}{key}");
        lookup(&name).map(|value| (name, value))
    };

    if let Some((name, value)) = var("MAX_RETRIES") {
        settings.retry.max_retries = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("BASE_DELAY_MS") {
        settings.retry.base_delay_ms = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("MAX_DELAY_MS") {
        settings.retry.max_delay_ms = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("RETRY_NON_IDEMPOTENT") {
        settings.retry.retry_non_idempotent = parse_flag(&name, &value)?;
    }
    if let Some((name, value)) = var("REQUEST_TIMEOUT_MS") {
        settings.request_timeout_ms = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("HISTORY_CAPACITY") {
        settings.history_capacity = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("TOKEN_SAFETY_BUFFER_SECS") {
        settings.token_safety_buffer_secs = parse_value(&name, &value)?;
    }
    if let Some((name, value)) = var("STRICT_PLACEHOLDERS") {
        settings.strict_placeholders = parse_flag(&name, &value)?;
    }
    if let Some((_, value)) = var("PLACEHOLDER_FALLBACK") {
        settings.placeholder_fallback = value;
    }
    if let Some((_, value)) = var("SENSITIVE_FIELDS") {
        settings.sensitive_fields.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        );
    }
    if let Some((name, value)) = var("SANITIZER_MAX_DEPTH") {
        settings.sanitizer_max_depth = parse_value(&name, &value)?;
    }
    if let Some((_, value)) = var("USER_AGENT") {
        settings.user_agent = value;
    }
    Ok(())
}
