//! Composition of the store and the connection registry.

use crate::error::AppResult;
use crate::store::Store;
use minidb_core::SequenceNumber;
use minidb_realtime::{socket, BroadcastReport, ConnectionId, ConnectionRegistry, Message};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::debug;

/// Outcome of [`App::persist_and_broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Sequence number the document was committed under.
    pub sequence: SequenceNumber,
    /// Fan-out result.
    pub report: BroadcastReport,
}

/// Application state shared by request handlers.
#[derive(Debug, Clone)]
pub struct App {
    store: Store,
    sockets: Arc<ConnectionRegistry>,
}

impl App {
    /// Creates an application over a store and a connection registry.
    #[must_use]
    pub fn new(store: Store, sockets: Arc<ConnectionRegistry>) -> Self {
        Self { store, sockets }
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn sockets(&self) -> &Arc<ConnectionRegistry> {
        &self.sockets
    }

    /// Stores `document` under `key`, then broadcasts it to every client.
    ///
    /// The two steps are independent: the broadcast starts only after the
    /// write has committed, but nothing orders it against writes or
    /// broadcasts issued by other handlers in between. The broadcast is
    /// skipped if the write fails.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Store::set_json`].
    pub async fn persist_and_broadcast(&self, key: &str, document: serde_json::Value) -> AppResult<Published> {
        let message = Message::json(&document);
        let sequence = self.store.set_json(key, document).await?;
        let report = self.sockets.broadcast(message).await;
        debug!(key, %sequence, delivered = report.delivered, pruned = report.pruned, "published");
        Ok(Published { sequence, report })
    }

    /// Serves WebSocket clients on `listener` until accepting fails.
    ///
    /// Every client is registered with [`App::sockets`]; its incoming
    /// messages are passed to `handler` together with a clone of the app.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting from the listener fails.
    pub async fn serve_sockets<F, Fut>(&self, listener: TcpListener, handler: F) -> AppResult<()>
    where
        F: Fn(App, ConnectionId, Message) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let app = self.clone();
        socket::run(listener, Arc::clone(&self.sockets), move |id, message| {
            handler(app.clone(), id, message)
        })
        .await?;
        Ok(())
    }
}
