//! Persisted entities.
//!
//! Everything the repository boundary stores: platforms, their resources,
//! handshakes, saved handshake snapshots and execution logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionError, LogEntry};
use crate::handshake::Handshake;
use crate::id::{HandshakeId, RunId};
use crate::run::{ExecutionRun, RunState};

/// A storable entity.
pub trait Entity: Clone + Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static {
    /// Name of the collection this entity lives in.
    const COLLECTION: &'static str;

    /// Stable key within the collection.
    fn entity_id(&self) -> String;
}

/// A third-party API provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Identifier (slug).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base URL of the API.
    pub base_url: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An endpoint or document exposed by a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier (slug).
    pub id: String,
    /// Owning platform.
    pub platform_id: String,
    /// Display name.
    pub name: String,
    /// Path or absolute URL.
    pub path: String,
}

/// A named snapshot of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedHandshake {
    /// Snapshot name.
    pub name: String,
    /// The handshake as it was saved.
    pub handshake: Handshake,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
}

/// The persisted log of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    /// Run this log belongs to.
    pub run_id: RunId,
    /// Handshake that was executed.
    pub handshake_id: HandshakeId,
    /// Terminal state.
    pub state: RunState,
    /// Log entries in order.
    pub entries: Vec<LogEntry>,
    /// Terminal error, for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&ExecutionRun> for ExecutionLogRecord {
    fn from(run: &ExecutionRun) -> Self {
        Self {
            run_id: run.id,
            handshake_id: run.handshake_id,
            state: run.state,
            entries: run.logs.clone(),
            error: run.error.clone(),
            finished_at: run.finished_at,
        }
    }
}

impl Entity for Platform {
    const COLLECTION: &'static str = "platforms";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Resource {
    const COLLECTION: &'static str = "resources";

    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Handshake {
    const COLLECTION: &'static str = "handshakes";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for SavedHandshake {
    const COLLECTION: &'static str = "saved_handshakes";

    fn entity_id(&self) -> String {
        format!("{}:{}", self.handshake.id, self.name)
    }
}

impl Entity for ExecutionLogRecord {
    const COLLECTION: &'static str = "execution_logs";

    fn entity_id(&self) -> String {
        self.run_id.to_string()
    }
}
