//! Execution engine
//!
//! [`HandshakeExecutor`] drives runs; [`RetryPolicy`] decides retries and
//! backoff; observers receive [`ExecutionEvent`]s as a run progresses.

mod executor;
mod observer;
mod retry;

pub use executor::{CancelHandle, HandshakeExecutor, RunInputs};
pub use observer::{ChannelObserver, ExecutionEvent, ExecutionObserver, NoopObserver};
pub use retry::RetryPolicy;
