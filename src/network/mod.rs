//! Connection lifecycle and the transports behind it.

use std::fmt;

use serde::Serialize;

pub mod connection;
pub mod simulated;
pub mod transport;
pub mod websocket;

pub use connection::{ConnectionEvent, ConnectionManager};
pub use simulated::SimulatedTransport;
pub use transport::{LinkCommand, Transport, TransportEvent, TransportEventKind, TransportSink};
pub use websocket::WebSocketTransport;

/// State of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    /// A link is open or being opened.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
