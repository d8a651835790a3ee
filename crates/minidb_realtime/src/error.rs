//! Error types for the connection registry.

use crate::connection::ConnectionId;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors that can occur in realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The connection is not registered, is closing, or failed delivery.
    #[error("connection {id} is closed")]
    ConnectionClosed {
        /// The connection.
        id: ConnectionId,
    },

    /// WebSocket protocol or transport error.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealtimeError {
    /// Creates a connection closed error.
    #[must_use]
    pub fn closed(id: ConnectionId) -> Self {
        Self::ConnectionClosed { id }
    }

    /// Returns whether this error means the peer is gone.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }
}

impl From<tungstenite::Error> for RealtimeError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
