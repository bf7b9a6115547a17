//! WebSocket transport port

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::TransportError;

/// One connect/send/receive exchange.
#[derive(Debug, Clone)]
pub struct WebSocketExchange {
    /// `ws://` or `wss://` URL.
    pub url: String,
    /// Handshake headers.
    pub headers: Vec<(String, String)>,
    /// Requested subprotocols.
    pub subprotocols: Vec<String>,
    /// Messages sent in order after connecting.
    pub messages: Vec<String>,
    /// Messages to receive before closing.
    pub expect_messages: usize,
    /// Upper bound for the whole exchange.
    pub timeout: Duration,
    /// Fires when the caller abandons the exchange.
    pub abort: CancellationToken,
}

/// Port for WebSocket message exchanges.
#[async_trait]
pub trait WebSocketTransport: Send + Sync {
    /// Connects, sends every message and collects the replies.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection fails or times out.
    async fn exchange(&self, exchange: WebSocketExchange) -> Result<Vec<String>, TransportError>;
}
