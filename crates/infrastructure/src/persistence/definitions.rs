//! Handshake definition files.

use std::path::Path;

use tether_domain::Handshake;
use tokio::fs;

use super::RepositoryError;
use crate::serialization::{DefinitionFormat, from_definition};

/// Reads a handshake from a `.json`, `.yaml` or `.yml` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not describe a
/// handshake.
pub async fn load_handshake(path: &Path) -> Result<Handshake, RepositoryError> {
    let content = fs::read_to_string(path).await?;
    let handshake: Handshake = from_definition(&content, DefinitionFormat::from_path(path))?;
    tracing::debug!(
        path = %path.display(),
        name = %handshake.name,
        requests = handshake.requests.len(),
        "loaded handshake definition"
    );
    Ok(handshake)
}
