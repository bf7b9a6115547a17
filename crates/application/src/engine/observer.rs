//! Execution events and observers.

use tether_domain::{HandshakeExecutionResult, HandshakeId, LogEntry, RunId, RunState};
use tokio::sync::mpsc;

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// The run moved to `Running`.
    RunStarted {
        /// Run identifier.
        run_id: RunId,
        /// Handshake being executed.
        handshake_id: HandshakeId,
    },
    /// Progress changed.
    Progress {
        /// Run identifier.
        run_id: RunId,
        /// New progress percentage.
        progress: u8,
    },
    /// A log entry was appended.
    Log {
        /// Run identifier.
        run_id: RunId,
        /// The entry.
        entry: LogEntry,
    },
    /// A request finished.
    Result {
        /// Run identifier.
        run_id: RunId,
        /// The request's outcome.
        result: Box<HandshakeExecutionResult>,
    },
    /// The run reached a terminal state.
    RunFinished {
        /// Run identifier.
        run_id: RunId,
        /// Terminal state.
        state: RunState,
    },
}

impl ExecutionEvent {
    /// The run this event belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::Log { run_id, .. }
            | Self::Result { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Receives execution events as they happen.
///
/// Called inline on the executing task; implementations must not block.
pub trait ExecutionObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &ExecutionEvent);
}

impl<F> ExecutionObserver for F
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExecutionEvent) {
        self(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn on_event(&self, _event: &ExecutionEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ExecutionObserver for ChannelObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (observer, mut receiver) = ChannelObserver::channel();
        let run_id = RunId::new();
        observer.on_event(&ExecutionEvent::Progress { run_id, progress: 50 });
        drop(observer);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.run_id(), run_id);
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |event: &ExecutionEvent| seen.lock().unwrap().push(event.run_id());
        let run_id = RunId::new();
        observer.on_event(&ExecutionEvent::RunFinished {
            run_id,
            state: RunState::Success,
        });
        assert_eq!(seen.lock().unwrap().clone(), vec![run_id]);
    }
}
