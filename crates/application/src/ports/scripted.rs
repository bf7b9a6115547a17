//! Scripted transport for tests and dry runs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{HttpTransport, TransportError, TransportRequest, TransportResponse};

type Reply = Result<TransportResponse, TransportError>;

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    fallback: Option<Reply>,
    requests: Vec<TransportRequest>,
}

/// A transport that answers from a queue of prepared replies.
///
/// Once the queue is empty the fallback reply is repeated; without a
/// fallback the transport answers `200` with an empty body. Every request is
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that always gives the same reply.
    #[must_use]
    pub fn always(reply: Reply) -> Self {
        let transport = Self::new();
        transport.set_fallback(reply);
        transport
    }

    /// Queues a reply.
    #[must_use]
    pub fn then(self, reply: Reply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.replies.push_back(reply);
        }
        self
    }

    /// Replaces the fallback reply.
    pub fn set_fallback(&self, reply: Reply) {
        if let Ok(mut script) = self.script.lock() {
            script.fallback = Some(reply);
        }
    }

    /// Waits this long before every reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.script
            .lock()
            .map(|script| script.requests.clone())
            .unwrap_or_default()
    }

    /// Returns the number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script.lock().map_or(0, |script| script.requests.len())
    }

    fn next_reply(&self, request: TransportRequest) -> Reply {
        let Ok(mut script) = self.script.lock() else {
            return Err(TransportError::Other("script lock poisoned".to_string()));
        };
        script.requests.push(request);
        script
            .replies
            .pop_front()
            .or_else(|| script.fallback.clone())
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "")))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let abort = request.abort.clone();
        let reply = self.next_reply(request);
        if let Some(delay) = self.delay {
            tokio::select! {
                () = abort.cancelled() => return Err(TransportError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
        reply
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tether_domain::{HttpMethod, RequestOptions};

    fn request() -> TransportRequest {
        TransportRequest::from_options(
            &RequestOptions::new(HttpMethod::Get, "https://x.io"),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let transport = ScriptedTransport::always(Ok(TransportResponse::new(500, "")))
            .then(Ok(TransportResponse::new(201, "first")));

        assert_eq!(transport.send(request()).await.unwrap().status, 201);
        assert_eq!(transport.send(request()).await.unwrap().status, 500);
        assert_eq!(transport.send(request()).await.unwrap().status, 500);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_honours_abort() {
        let transport = ScriptedTransport::new().with_delay(Duration::from_secs(10));
        let req = request();
        let abort = req.abort.clone();
        let call = tokio::spawn({
            let transport = transport.clone();
            async move { transport.send(req).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        abort.cancel();
        assert_eq!(call.await.unwrap(), Err(TransportError::Cancelled));
    }
}
