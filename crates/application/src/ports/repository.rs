//! Repository port
//!
//! The persistence boundary. Every operation answers with the same
//! `{success, data?, error?}` envelope.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_domain::catalog::Entity;
use tokio::sync::RwLock;

/// Uniform repository answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> RepositoryResponse<T> {
    /// A successful answer carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed answer.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Converts the envelope into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the error message when `success` is false or no data is present.
    pub fn into_result(self) -> Result<T, String> {
        let Self {
            success,
            data,
            error,
        } = self;
        match data {
            Some(data) if success => Ok(data),
            _ => Err(error.unwrap_or_else(|| "no data".to_string())),
        }
    }
}

/// CRUD access to one entity collection.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Lists every entity in the collection.
    async fn list(&self) -> RepositoryResponse<Vec<T>>;

    /// Loads one entity; `data` is `None` when it does not exist.
    async fn get(&self, id: &str) -> RepositoryResponse<Option<T>>;

    /// Inserts or replaces an entity.
    async fn save(&self, entity: T) -> RepositoryResponse<T>;

    /// Deletes an entity; `data` tells whether it existed.
    async fn delete(&self, id: &str) -> RepositoryResponse<bool>;
}

/// Thread-safe in-memory repository.
#[derive(Debug, Clone)]
pub struct InMemoryRepository<T> {
    entries: Arc<RwLock<BTreeMap<String, T>>>,
}

impl<T> InMemoryRepository<T> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn list(&self) -> RepositoryResponse<Vec<T>> {
        let entries = self.entries.read().await;
        RepositoryResponse::ok(entries.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> RepositoryResponse<Option<T>> {
        let entries = self.entries.read().await;
        RepositoryResponse::ok(entries.get(id).cloned())
    }

    async fn save(&self, entity: T) -> RepositoryResponse<T> {
        let mut entries = self.entries.write().await;
        entries.insert(entity.entity_id(), entity.clone());
        RepositoryResponse::ok(entity)
    }

    async fn delete(&self, id: &str) -> RepositoryResponse<bool> {
        let mut entries = self.entries.write().await;
        RepositoryResponse::ok(entries.remove(id).is_some())
    }
}
