//! WebSocket glue for the registry.
//!
//! [`serve`] owns one client channel from registration to removal: it pumps
//! the connection's outbound queue into the socket, hands every incoming
//! message to a caller-supplied handler, and disconnects exactly once when
//! either side goes away.

use crate::connection::{Connection, ConnectionId};
use crate::error::{RealtimeError, RealtimeResult};
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite, WebSocketStream};
use tracing::{debug, info, warn};

/// Performs the WebSocket handshake on an accepted TCP stream.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn accept(stream: TcpStream) -> RealtimeResult<WebSocketStream<TcpStream>> {
    Ok(tokio_tungstenite::accept_async(stream).await?)
}

/// Serves one WebSocket connection until either side closes it.
///
/// The connection is registered before the first message is read and
/// removed when this function returns, whatever the reason.
///
/// # Errors
///
/// Returns an error if the socket fails while reading. A peer that closes
/// normally is not an error.
pub async fn serve<S, F, Fut>(
    registry: Arc<ConnectionRegistry>,
    ws: WebSocketStream<S>,
    mut handler: F,
) -> RealtimeResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnMut(ConnectionId, Message) -> Fut,
    Fut: Future<Output = ()>,
{
    let (connection, mut outbound) = Connection::new();
    registry.connect(&connection)?;
    let guard = ConnectionGuard::new(Arc::clone(&registry), Arc::clone(&connection));
    let id = guard.id();
    let (mut sink, mut stream) = ws.split();

    let writer = {
        let connection = Arc::clone(&connection);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Queued messages go out before a close is honoured.
                    biased;
                    message = outbound.recv() => {
                        let Some(message) = message else { break };
                        if let Err(err) = sink.send(tungstenite::Message::from(message)).await {
                            debug!(connection = %id, error = %err, "socket send failed");
                            registry.disconnect(&connection);
                            break;
                        }
                    }
                    () = connection.closed() => break,
                }
            }
            if let Err(err) = sink.close().await {
                debug!(connection = %id, error = %err, "socket close failed");
            }
        })
    };

    let result = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                None | Some(Ok(tungstenite::Message::Close(_))) => break Ok(()),
                Some(Ok(frame)) => {
                    if let Some(message) = Message::from_frame(frame) {
                        handler(id, message).await;
                    }
                }
                Some(Err(err)) => break Err(RealtimeError::from(err)),
            },
            () = connection.closed() => break Ok(()),
        }
    };

    drop(guard);
    if let Err(err) = writer.await {
        warn!(connection = %id, error = %err, "socket writer task failed");
    }
    result
}

/// Accepts connections forever, serving each on its own task.
///
/// Every connection gets a clone of `handler`.
///
/// # Errors
///
/// Returns an error if accepting from the listener fails.
pub async fn run<F, Fut>(listener: TcpListener, registry: Arc<ConnectionRegistry>, handler: F) -> RealtimeResult<()>
where
    F: FnMut(ConnectionId, Message) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "accepting websocket connections");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = Arc::clone(&registry);
        let handler = handler.clone();
        tokio::spawn(async move {
            let ws = match accept(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    debug!(%peer, error = %err, "websocket handshake failed");
                    return;
                }
            };
            if let Err(err) = serve(registry, ws, handler).await {
                debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

/// Disconnects a connection when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    connection: Arc<Connection>,
}

impl ConnectionGuard {
    /// Creates a guard for a registered connection.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, connection: Arc<Connection>) -> Self {
        Self { registry, connection }
    }

    /// Returns the guarded connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Returns the id of the guarded connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    #[test]
    fn guard_disconnects_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _out) = Connection::new();
        registry.connect(&conn).unwrap();

        let guard = ConnectionGuard::new(Arc::clone(&registry), Arc::clone(&conn));
        assert_eq!(guard.id(), conn.id());
        assert!(Arc::ptr_eq(guard.connection(), &conn));
        drop(guard);

        assert!(registry.is_empty());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!registry.disconnect(&conn));
    }

    #[test]
    fn guard_after_explicit_disconnect() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _out) = Connection::new();
        registry.connect(&conn).unwrap();
        let guard = ConnectionGuard::new(Arc::clone(&registry), Arc::clone(&conn));

        assert!(registry.disconnect(&conn));
        drop(guard);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
