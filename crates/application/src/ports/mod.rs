//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod clock;
mod http_transport;
mod repository;
mod scripted;
mod websocket;

pub use clock::{Clock, FixedClock};
pub use http_transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
pub use repository::{InMemoryRepository, Repository, RepositoryResponse};
pub use scripted::ScriptedTransport;
pub use websocket::{WebSocketExchange, WebSocketTransport};
