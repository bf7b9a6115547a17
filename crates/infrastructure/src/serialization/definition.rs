//! Handshake definition files, JSON or YAML.

use std::path::Path;

use serde::de::DeserializeOwned;

use super::json::{SerializationError, from_json};

/// Format of a definition file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    /// `.json` and anything unrecognised.
    Json,
    /// `.yaml` or `.yml`.
    Yaml,
}

impl DefinitionFormat {
    /// Picks the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Deserializes a definition in the given format.
///
/// # Errors
///
/// Returns an error if the content is malformed or does not match `T`.
pub fn from_definition<T: DeserializeOwned>(
    content: &str,
    format: DefinitionFormat,
) -> Result<T, SerializationError> {
    match format {
        DefinitionFormat::Json => from_json(content),
        DefinitionFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}
