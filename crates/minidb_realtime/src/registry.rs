//! The set of live connections and fan-out delivery.
//!
//! ## Concurrency
//!
//! Membership lives behind a short-lived `RwLock`. Enumeration copies the
//! member list out of the lock first, so `broadcast` never holds it across an
//! `.await` and a concurrent `connect` or `disconnect` cannot invalidate the
//! iteration.
//!
//! A member whose delivery fails is removed on the spot. Transport failures
//! therefore never accumulate dead entries.

use crate::connection::{Connection, ConnectionId};
use crate::error::{RealtimeError, RealtimeResult};
use crate::message::Message;
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// How long a delivery waits for room in a full outbound queue.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Members the message was queued for.
    pub delivered: usize,
    /// Members removed because delivery failed.
    pub pruned: usize,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Messages queued for a connection.
    pub messages_sent: u64,
    /// Deliveries that failed.
    pub messages_dropped: u64,
    /// Connections removed after a failed delivery.
    pub connections_pruned: u64,
    /// Currently registered connections.
    pub active_connections: usize,
}

/// Registry of live client connections.
///
/// ## Example
///
/// ```rust
/// use minidb_realtime::{Connection, ConnectionRegistry, Message};
///
/// # tokio_test_block(async {
/// let registry = ConnectionRegistry::new();
/// let (conn, mut outbound) = Connection::new();
/// assert!(registry.connect(&conn).unwrap());
///
/// let report = registry.broadcast(Message::text("hello")).await;
/// assert_eq!(report.delivered, 1);
/// assert_eq!(outbound.recv().await, Some(Message::text("hello")));
///
/// assert!(registry.disconnect(&conn));
/// assert!(!registry.disconnect(&conn));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    send_timeout: Duration,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    connections_pruned: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_send_timeout(SEND_TIMEOUT)
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with a custom delivery timeout.
    #[must_use]
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            send_timeout,
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            connections_pruned: AtomicU64::new(0),
        }
    }

    /// Registers an open connection.
    ///
    /// Returns `false` if it was already registered.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection is closing or closed.
    pub fn connect(&self, connection: &Arc<Connection>) -> RealtimeResult<bool> {
        let mut connections = self.connections.write();
        // Checked under the lock so a concurrent disconnect either sees the
        // entry or makes this call fail.
        if !connection.is_open() {
            return Err(RealtimeError::closed(connection.id()));
        }
        if connections.contains_key(&connection.id()) {
            return Ok(false);
        }
        connections.insert(connection.id(), Arc::clone(connection));
        debug!(connection = %connection.id(), active = connections.len(), "connection registered");
        Ok(true)
    }

    /// Closes and unregisters a connection.
    ///
    /// Any send pending on the connection fails promptly. Returns `false` if
    /// the connection was already closing or closed.
    pub fn disconnect(&self, connection: &Connection) -> bool {
        if !connection.begin_close() {
            return false;
        }
        let removed = self.connections.write().remove(&connection.id()).is_some();
        connection.finish_close();
        if removed {
            debug!(connection = %connection.id(), "connection removed");
        }
        removed
    }

    /// Closes and unregisters the connection with the given id.
    pub fn disconnect_id(&self, id: ConnectionId) -> bool {
        let connection = self.connections.read().get(&id).cloned();
        connection.is_some_and(|connection| self.disconnect(&connection))
    }

    /// Queues `message` for every registered connection.
    ///
    /// Members are snapshotted when the call starts; connections registered
    /// afterwards are not included. Deliveries run concurrently and the call
    /// returns once each has been queued or has failed, so two broadcasts
    /// issued one after the other arrive in that order on every connection.
    /// Members whose delivery fails are disconnected.
    pub async fn broadcast(&self, message: Message) -> BroadcastReport {
        let members: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();
        trace!(members = members.len(), bytes = message.len(), "broadcast");

        let deliveries = members.iter().map(|connection| {
            let message = message.clone();
            async move { connection.deliver(message, self.send_timeout).await }
        });
        let results = join_all(deliveries).await;

        let mut report = BroadcastReport::default();
        for (connection, result) in members.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(reason) => {
                    debug!(connection = %connection.id(), %reason, "broadcast delivery failed");
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    if self.disconnect(connection) {
                        report.pruned += 1;
                        self.connections_pruned.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        self.messages_sent.fetch_add(report.delivered as u64, Ordering::Relaxed);
        report
    }

    /// Queues `message` for one connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection is not registered or the
    /// delivery fails. A failed connection is disconnected.
    pub async fn send_to(&self, id: ConnectionId, message: Message) -> RealtimeResult<()> {
        let connection = self.connections.read().get(&id).cloned();
        let Some(connection) = connection else {
            return Err(RealtimeError::closed(id));
        };

        match connection.deliver(message, self.send_timeout).await {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(reason) => {
                debug!(connection = %id, %reason, "delivery failed");
                self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                if self.disconnect(&connection) {
                    self.connections_pruned.fetch_add(1, Ordering::Relaxed);
                }
                Err(RealtimeError::closed(id))
            }
        }
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Returns whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Returns the ids of the registered connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().copied().collect()
    }

    /// Returns a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            connections_pruned: self.connections_pruned.load(Ordering::Relaxed),
            active_connections: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    fn short_timeout() -> ConnectionRegistry {
        ConnectionRegistry::with_send_timeout(Duration::from_millis(50))
    }

    #[test]
    fn connect_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _out) = Connection::new();
        assert!(registry.connect(&conn).unwrap());
        assert!(!registry.connect(&conn).unwrap());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(conn.id()));
        assert_eq!(registry.connection_ids(), vec![conn.id()]);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _out) = Connection::new();
        registry.connect(&conn).unwrap();

        assert!(registry.disconnect(&conn));
        assert!(!registry.disconnect(&conn));
        assert!(!registry.disconnect_id(conn.id()));
        assert!(registry.is_empty());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn closed_is_terminal() {
        let registry = ConnectionRegistry::new();
        let (conn, _out) = Connection::new();
        registry.connect(&conn).unwrap();
        assert!(registry.disconnect_id(conn.id()));

        let err = registry.connect(&conn).unwrap_err();
        assert!(err.is_connection_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let registry = ConnectionRegistry::new();
        let mut outs = Vec::new();
        for _ in 0..3 {
            let (conn, out) = Connection::new();
            registry.connect(&conn).unwrap();
            outs.push(out);
        }

        let report = registry.broadcast(Message::text("m")).await;
        assert_eq!(report, BroadcastReport { delivered: 3, pruned: 0 });
        for out in &mut outs {
            assert_eq!(out.try_recv(), Some(Message::text("m")));
            assert_eq!(out.try_recv(), None);
        }
        assert_eq!(registry.stats().messages_sent, 3);
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.broadcast(Message::text("m")).await, BroadcastReport::default());
    }

    #[tokio::test]
    async fn member_disconnecting_mid_broadcast() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a, mut out_a) = Connection::new();
        let (b, mut out_b) = Connection::with_capacity(1);
        let (c, mut out_c) = Connection::new();
        for conn in [&a, &b, &c] {
            registry.connect(conn).unwrap();
        }

        // Fill B's queue so the next delivery to it blocks.
        registry.broadcast(Message::text("first")).await;

        let disconnector = {
            let registry = Arc::clone(&registry);
            let b = Arc::clone(&b);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                assert!(registry.disconnect(&b));
            })
        };
        let report = tokio::time::timeout(Duration::from_secs(2), registry.broadcast(Message::text("second")))
            .await
            .unwrap();
        disconnector.await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, 0);
        for out in [&mut out_a, &mut out_c] {
            assert_eq!(out.try_recv(), Some(Message::text("first")));
            assert_eq!(out.try_recv(), Some(Message::text("second")));
        }
        assert_eq!(out_b.try_recv(), Some(Message::text("first")));
        assert_eq!(out_b.try_recv(), None);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(b.id()));
    }

    #[tokio::test]
    async fn failed_member_is_pruned() {
        let registry = ConnectionRegistry::new();
        let (alive, mut out_alive) = Connection::new();
        let (dead, out_dead) = Connection::new();
        registry.connect(&alive).unwrap();
        registry.connect(&dead).unwrap();
        // Simulates the transport task dying.
        drop(out_dead);

        let report = registry.broadcast(Message::text("m")).await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert_eq!(registry.len(), 1);
        assert_eq!(dead.state(), ConnectionState::Closed);
        assert_eq!(out_alive.try_recv(), Some(Message::text("m")));

        let report = registry.broadcast(Message::text("again")).await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 0 });

        let stats = registry.stats();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.connections_pruned, 1);
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn slow_consumer_is_pruned_after_timeout() {
        let registry = short_timeout();
        let (slow, _out_slow) = Connection::with_capacity(1);
        let (fast, mut out_fast) = Connection::new();
        registry.connect(&slow).unwrap();
        registry.connect(&fast).unwrap();

        assert_eq!(registry.broadcast(Message::text("1")).await.delivered, 2);
        let report = registry.broadcast(Message::text("2")).await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert!(!registry.contains(slow.id()));
        assert_eq!(out_fast.try_recv(), Some(Message::text("1")));
        assert_eq!(out_fast.try_recv(), Some(Message::text("2")));
    }

    #[tokio::test]
    async fn sequential_broadcasts_keep_order() {
        let registry = ConnectionRegistry::new();
        let (conn, mut out) = Connection::new();
        registry.connect(&conn).unwrap();

        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            while seen.len() < 100 {
                match out.recv().await {
                    Some(message) => seen.push(message),
                    None => break,
                }
            }
            seen
        });
        for i in 0..100 {
            registry.broadcast(Message::text(i.to_string())).await;
        }

        let seen = reader.await.unwrap();
        let expected: Vec<Message> = (0..100).map(|i| Message::text(i.to_string())).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let registry = ConnectionRegistry::new();
        let (a, mut out_a) = Connection::new();
        let (b, mut out_b) = Connection::new();
        registry.connect(&a).unwrap();
        registry.connect(&b).unwrap();

        registry.send_to(b.id(), Message::text("direct")).await.unwrap();
        assert_eq!(out_b.try_recv(), Some(Message::text("direct")));
        assert_eq!(out_a.try_recv(), None);
    }

    #[tokio::test]
    async fn send_to_unknown_or_failed_connection() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .send_to(ConnectionId::new(), Message::text("x"))
            .await
            .unwrap_err();
        assert!(err.is_connection_closed());

        let (conn, out) = Connection::new();
        registry.connect(&conn).unwrap();
        drop(out);
        let err = registry.send_to(conn.id(), Message::text("x")).await.unwrap_err();
        assert!(err.is_connection_closed());
        assert!(registry.is_empty());
        assert_eq!(registry.stats().connections_pruned, 1);
    }

    #[tokio::test]
    async fn concurrent_connect_and_disconnect_during_broadcasts() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut keep = Vec::new();
        for _ in 0..8 {
            let (conn, out) = Connection::new();
            registry.connect(&conn).unwrap();
            keep.push((conn, out));
        }

        let churn = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let (conn, _out) = Connection::new();
                    registry.connect(&conn).unwrap();
                    tokio::task::yield_now().await;
                    registry.disconnect(&conn);
                }
            })
        };
        for _ in 0..50 {
            let report = registry.broadcast(Message::text("tick")).await;
            assert!(report.delivered >= 8);
        }
        churn.await.unwrap();

        assert_eq!(registry.len(), 8);
        for (_, out) in &mut keep {
            let mut count = 0;
            while out.try_recv().is_some() {
                count += 1;
            }
            assert_eq!(count, 50);
        }
    }
}
