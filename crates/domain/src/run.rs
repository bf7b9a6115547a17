//! Execution run state machine.
//!
//! A run moves strictly forward:
//! `Pending -> Running -> {Success | Failed | Cancelled}`.
//! Terminal states never change again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::execution::{ExecutionError, HandshakeExecutionResult, LogEntry};
use crate::id::{HandshakeId, RunId};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not started.
    #[default]
    Pending,
    /// Executing requests.
    Running,
    /// Every executed request succeeded.
    Success,
    /// Authentication or a request failed.
    Failed,
    /// Stopped by an explicit cancel.
    Cancelled,
}

impl RunState {
    /// Returns true for `Success`, `Failed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Success | Self::Failed | Self::Cancelled)
        )
    }

    /// Returns the identifier used in logs and serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate indicator derived from the most recent run of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthIndicator {
    /// Last run succeeded.
    Healthy,
    /// Last run failed or was cancelled.
    Failed,
    /// A run is pending or running.
    Processing,
    /// Configured but never run.
    Configured,
    /// Not configured.
    Unconfigured,
}

/// One invocation of a handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    /// Run identifier.
    pub id: RunId,
    /// Handshake this run executes.
    pub handshake_id: HandshakeId,
    /// Current state.
    pub state: RunState,
    /// Progress percentage while running (0-100, never decreases).
    pub progress: u8,
    /// Results in execution order.
    #[serde(default)]
    pub results: Vec<HandshakeExecutionResult>,
    /// Append-only run log.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run started executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal error for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl ExecutionRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(handshake_id: HandshakeId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RunId::new(),
            handshake_id,
            state: RunState::Pending,
            progress: 0,
            results: Vec::new(),
            logs: Vec::new(),
            created_at,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Moves the run to `next`, stamping start/end times.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for backward or skipping moves.
    pub fn transition(&mut self, next: RunState, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        match next {
            RunState::Running => self.started_at = Some(at),
            RunState::Success => {
                self.progress = 100;
                self.finished_at = Some(at);
            }
            RunState::Failed | RunState::Cancelled => self.finished_at = Some(at),
            RunState::Pending => {}
        }
        Ok(())
    }

    /// Raises progress; lower values and values outside a running run are ignored.
    pub fn advance_progress(&mut self, progress: u8) {
        if self.state == RunState::Running {
            self.progress = self.progress.max(progress.min(100));
        }
    }

    /// Returns true once the run is in a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the run duration, if it has both ends.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
