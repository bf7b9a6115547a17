//! Execution lifecycle tracking.
//!
//! Active runs are kept by id; finished runs move into a bounded history
//! ring where the oldest entry is evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_domain::{
    ExecutionError, ExecutionRun, HandshakeExecutionResult, HandshakeId, HealthIndicator,
    LogEntry, RunId, RunState,
};
use tokio::sync::RwLock;

use crate::error::{ApplicationError, ApplicationResult};

/// Default number of finished runs kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct TrackerState {
    active: HashMap<RunId, ExecutionRun>,
    history: VecDeque<ExecutionRun>,
}

/// Thread-safe registry of execution runs.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
    state: Arc<RwLock<TrackerState>>,
    capacity: usize,
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

fn missing(run_id: RunId) -> ApplicationError {
    ApplicationError::NotFound(format!("active run {run_id}"))
}

impl ExecutionTracker {
    /// Creates a tracker keeping at most `capacity` finished runs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(TrackerState::default())),
            capacity: capacity.max(1),
        }
    }

    /// History capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a pending run for `handshake_id`.
    pub async fn create_run(&self, handshake_id: HandshakeId, at: DateTime<Utc>) -> ExecutionRun {
        let run = ExecutionRun::new(handshake_id, at);
        let mut state = self.state.write().await;
        state.active.insert(run.id, run.clone());
        run
    }

    async fn update<T>(
        &self,
        run_id: RunId,
        f: impl FnOnce(&mut ExecutionRun) -> ApplicationResult<T>,
    ) -> ApplicationResult<T> {
        let mut state = self.state.write().await;
        let run = state.active.get_mut(&run_id).ok_or_else(|| missing(run_id))?;
        f(run)
    }

    /// Moves a pending run to `Running`.
    ///
    /// # Errors
    ///
    /// Fails for unknown runs and runs that are not pending.
    pub async fn start(&self, run_id: RunId, at: DateTime<Utc>) -> ApplicationResult<()> {
        self.update(run_id, |run| Ok(run.transition(RunState::Running, at)?))
            .await
    }

    /// Raises the progress of a running run and returns the new value.
    ///
    /// Lower values are ignored, so progress never decreases.
    ///
    /// # Errors
    ///
    /// Fails for unknown or finished runs.
    pub async fn set_progress(&self, run_id: RunId, progress: u8) -> ApplicationResult<u8> {
        self.update(run_id, |run| {
            run.advance_progress(progress);
            Ok(run.progress)
        })
        .await
    }

    /// Appends a log entry.
    ///
    /// # Errors
    ///
    /// Fails for unknown or finished runs.
    pub async fn append_log(&self, run_id: RunId, entry: LogEntry) -> ApplicationResult<()> {
        self.update(run_id, |run| {
            run.logs.push(entry);
            Ok(())
        })
        .await
    }

    /// Records a request result.
    ///
    /// # Errors
    ///
    /// Fails for unknown or finished runs.
    pub async fn record_result(
        &self,
        run_id: RunId,
        result: HandshakeExecutionResult,
    ) -> ApplicationResult<()> {
        self.update(run_id, |run| {
            run.results.push(result);
            Ok(())
        })
        .await
    }

    /// Moves a run to a terminal state and into the history ring.
    ///
    /// # Errors
    ///
    /// Fails for unknown runs and illegal transitions; the run stays active
    /// in that case.
    pub async fn finish(
        &self,
        run_id: RunId,
        outcome: RunState,
        error: Option<ExecutionError>,
        at: DateTime<Utc>,
    ) -> ApplicationResult<ExecutionRun> {
        let mut state = self.state.write().await;
        let run = state.active.get_mut(&run_id).ok_or_else(|| missing(run_id))?;
        if !outcome.is_terminal() {
            return Err(ApplicationError::Domain(
                tether_domain::DomainError::InvalidTransition {
                    from: run.state.to_string(),
                    to: outcome.to_string(),
                },
            ));
        }
        run.transition(outcome, at)?;
        run.error = error;

        let finished = state.active.remove(&run_id).ok_or_else(|| missing(run_id))?;
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(finished.clone());
        Ok(finished)
    }

    /// Looks a run up among active and finished runs.
    pub async fn get(&self, run_id: RunId) -> Option<ExecutionRun> {
        let state = self.state.read().await;
        state
            .active
            .get(&run_id)
            .or_else(|| state.history.iter().find(|r| r.id == run_id))
            .cloned()
    }

    /// All known runs of a handshake, oldest first.
    pub async fn runs_for_handshake(&self, handshake_id: HandshakeId) -> Vec<ExecutionRun> {
        let state = self.state.read().await;
        let mut runs: Vec<ExecutionRun> = state
            .history
            .iter()
            .chain(state.active.values())
            .filter(|r| r.handshake_id == handshake_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    /// The most recent run of a handshake.
    ///
    /// An active run is preferred over finished ones.
    pub async fn latest_for_handshake(&self, handshake_id: HandshakeId) -> Option<ExecutionRun> {
        let state = self.state.read().await;
        state
            .active
            .values()
            .filter(|r| r.handshake_id == handshake_id)
            .max_by_key(|r| r.created_at)
            .or_else(|| {
                state
                    .history
                    .iter()
                    .rev()
                    .find(|r| r.handshake_id == handshake_id)
            })
            .cloned()
    }

    /// Health of a handshake derived from its most recent run.
    pub async fn health(&self, handshake_id: HandshakeId, configured: bool) -> HealthIndicator {
        if !configured {
            return HealthIndicator::Unconfigured;
        }
        match self.latest_for_handshake(handshake_id).await.map(|r| r.state) {
            None => HealthIndicator::Configured,
            Some(RunState::Pending | RunState::Running) => HealthIndicator::Processing,
            Some(RunState::Success) => HealthIndicator::Healthy,
            Some(RunState::Failed | RunState::Cancelled) => HealthIndicator::Failed,
        }
    }

    /// Number of runs not yet finished.
    pub async fn active_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Number of finished runs retained.
    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tether_domain::{ErrorCode, LogLevel};

    #[tokio::test]
    async fn test_run_lifecycle() {
        let tracker = ExecutionTracker::default();
        let handshake = HandshakeId::new();
        let now = Utc::now();

        let run = tracker.create_run(handshake, now).await;
        assert_eq!(tracker.health(handshake, true).await, HealthIndicator::Processing);

        tracker.start(run.id, now).await.unwrap();
        assert_eq!(tracker.set_progress(run.id, 60).await.unwrap(), 60);
        assert_eq!(tracker.set_progress(run.id, 30).await.unwrap(), 60);
        tracker
            .append_log(run.id, LogEntry::new(now, LogLevel::Info, "hello"))
            .await
            .unwrap();

        let finished = tracker.finish(run.id, RunState::Success, None, now).await.unwrap();
        assert_eq!(finished.progress, 100);
        assert_eq!(finished.logs.len(), 1);
        assert_eq!(tracker.active_count().await, 0);
        assert_eq!(tracker.get(run.id).await.unwrap().state, RunState::Success);
        assert_eq!(tracker.health(handshake, true).await, HealthIndicator::Healthy);
    }

    #[tokio::test]
    async fn test_finished_runs_are_immutable() {
        let tracker = ExecutionTracker::default();
        let now = Utc::now();
        let run = tracker.create_run(HandshakeId::new(), now).await;
        tracker.start(run.id, now).await.unwrap();
        tracker
            .finish(
                run.id,
                RunState::Failed,
                Some(ExecutionError::new(ErrorCode::AuthError, "denied")),
                now,
            )
            .await
            .unwrap();

        assert!(tracker.set_progress(run.id, 10).await.is_err());
        assert!(tracker.finish(run.id, RunState::Success, None, now).await.is_err());
        assert_eq!(
            tracker.get(run.id).await.unwrap().error.unwrap().code,
            ErrorCode::AuthError
        );
    }

    #[tokio::test]
    async fn test_non_terminal_finish_rejected() {
        let tracker = ExecutionTracker::default();
        let now = Utc::now();
        let run = tracker.create_run(HandshakeId::new(), now).await;
        tracker.start(run.id, now).await.unwrap();
        assert!(tracker.finish(run.id, RunState::Running, None, now).await.is_err());
        assert_eq!(tracker.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_history_ring_is_bounded() {
        let tracker = ExecutionTracker::new(2);
        let handshake = HandshakeId::new();
        let start = Utc::now();
        let mut ids = Vec::new();
        for i in 0..3 {
            let at = start + chrono::Duration::seconds(i);
            let run = tracker.create_run(handshake, at).await;
            tracker.start(run.id, at).await.unwrap();
            tracker.finish(run.id, RunState::Cancelled, None, at).await.unwrap();
            ids.push(run.id);
        }

        assert_eq!(tracker.history_len().await, 2);
        assert!(tracker.get(ids[0]).await.is_none());
        let runs = tracker.runs_for_handshake(handshake).await;
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), ids[1..].to_vec());
        assert_eq!(tracker.latest_for_handshake(handshake).await.unwrap().id, ids[2]);
        assert_eq!(tracker.health(handshake, true).await, HealthIndicator::Failed);
    }

    #[tokio::test]
    async fn test_health_without_runs() {
        let tracker = ExecutionTracker::default();
        let handshake = HandshakeId::new();
        assert_eq!(tracker.health(handshake, false).await, HealthIndicator::Unconfigured);
        assert_eq!(tracker.health(handshake, true).await, HealthIndicator::Configured);
    }
}
