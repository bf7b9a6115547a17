//! JSON file repository.
//!
//! Each collection lives in `<root>/<collection>.json` as an object keyed by
//! entity id. Writes go to a temporary sibling first and are renamed into
//! place so a crash never leaves a truncated file.

use std::collections::BTreeMap;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tether_application::ports::{Repository, RepositoryResponse};
use tether_domain::catalog::Entity;
use tokio::fs;
use tokio::sync::Mutex;

use crate::serialization::{SerializationError, from_json_bytes, to_json_stable_bytes};

/// Error type for file repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

/// Repository storing one entity collection in a JSON file.
#[derive(Debug)]
pub struct JsonFileRepository<T> {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    entity: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonFileRepository<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            lock: Arc::clone(&self.lock),
            entity: PhantomData,
        }
    }
}

impl<T: Entity> JsonFileRepository<T> {
    /// Creates a repository under `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(format!("{}.json", T::COLLECTION)),
            lock: Arc::new(Mutex::new(())),
            entity: PhantomData,
        }
    }

    /// File holding the collection.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, T>, RepositoryError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(from_json_bytes(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, T>) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, to_json_stable_bytes(entries)?).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

fn respond<T>(collection: &str, result: Result<T, RepositoryError>) -> RepositoryResponse<T> {
    match result {
        Ok(data) => RepositoryResponse::ok(data),
        Err(e) => {
            tracing::warn!(collection, error = %e, "repository operation failed");
            RepositoryResponse::err(e.to_string())
        }
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for JsonFileRepository<T> {
    async fn list(&self) -> RepositoryResponse<Vec<T>> {
        let _guard = self.lock.lock().await;
        let result = self.read_all().await.map(|entries| entries.into_values().collect());
        respond(T::COLLECTION, result)
    }

    async fn get(&self, id: &str) -> RepositoryResponse<Option<T>> {
        let _guard = self.lock.lock().await;
        let result = self.read_all().await.map(|mut entries| entries.remove(id));
        respond(T::COLLECTION, result)
    }

    async fn save(&self, entity: T) -> RepositoryResponse<T> {
        let _guard = self.lock.lock().await;
        let result = async {
            let mut entries = self.read_all().await?;
            entries.insert(entity.entity_id(), entity.clone());
            self.write_all(&entries).await?;
            Ok::<_, RepositoryError>(entity)
        }
        .await;
        respond(T::COLLECTION, result)
    }

    async fn delete(&self, id: &str) -> RepositoryResponse<bool> {
        let _guard = self.lock.lock().await;
        let result = async {
            let mut entries = self.read_all().await?;
            let existed = entries.remove(id).is_some();
            if existed {
                self.write_all(&entries).await?;
            }
            Ok::<_, RepositoryError>(existed)
        }
        .await;
        respond(T::COLLECTION, result)
    }
}
