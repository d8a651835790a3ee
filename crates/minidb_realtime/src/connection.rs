//! Connection handles and their lifecycle.
//!
//! A [`Connection`] is the registry's view of one client channel. Messages
//! addressed to it go into a bounded FIFO queue drained by the socket task
//! through the matching [`Outbound`] receiver.
//!
//! ## States
//!
//! ```text
//! Open ──disconnect──▶ Closing ──▶ Closed
//! ```
//!
//! Only the transition out of `Open` is contended; it is a compare-and-swap,
//! so exactly one caller performs the close. `Closed` is terminal.

use crate::message::Message;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Capacity of a connection's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepting messages.
    Open = 0,
    /// A disconnect is in progress.
    Closing = 1,
    /// Terminal.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a delivery did not reach the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryFailure {
    /// The connection closed before or during the send.
    Closed,
    /// The outbound receiver was dropped.
    ReceiverGone,
    /// The queue stayed full for the whole send timeout.
    TimedOut,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::ReceiverGone => write!(f, "receiver dropped"),
            Self::TimedOut => write!(f, "send timed out"),
        }
    }
}

/// One client channel.
pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    outbound: mpsc::Sender<Message>,
    closed: Notify,
}

impl Connection {
    /// Creates an open connection with the default queue capacity.
    #[must_use]
    pub fn new() -> (Arc<Self>, Outbound) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    /// Creates an open connection whose outbound queue holds `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = ConnectionId::new();
        let connection = Arc::new(Self {
            id,
            state: AtomicU8::new(ConnectionState::Open as u8),
            outbound: tx,
            closed: Notify::new(),
        });
        (connection, Outbound { id, rx })
    }

    /// Returns the connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns whether the connection still accepts messages.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Waits until the connection reaches `Closed`.
    pub async fn closed(&self) {
        let notified = self.closed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.state() == ConnectionState::Closed {
            return;
        }
        notified.await;
    }

    /// Moves `Open -> Closing`. Returns `false` if another caller won.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to `Closed` and wakes every pending send and waiter.
    pub(crate) fn finish_close(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
        self.closed.notify_waiters();
    }

    /// Queues `message`, waiting at most `timeout` for room.
    ///
    /// A close that happens while the send is pending fails it immediately.
    pub(crate) async fn deliver(&self, message: Message, timeout: Duration) -> Result<(), DeliveryFailure> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();
        if !self.is_open() {
            return Err(DeliveryFailure::Closed);
        }

        tokio::select! {
            biased;
            () = &mut closed => Err(DeliveryFailure::Closed),
            result = self.outbound.send(message) => result.map_err(|_| DeliveryFailure::ReceiverGone),
            () = tokio::time::sleep(timeout) => Err(DeliveryFailure::TimedOut),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Receiving half of a connection's outbound queue.
#[derive(Debug)]
pub struct Outbound {
    id: ConnectionId,
    rx: mpsc::Receiver<Message>,
}

impl Outbound {
    /// Returns the id of the connection this queue belongs to.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next queued message.
    ///
    /// Returns `None` once the connection has been dropped and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Receives a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn ids_are_unique() {
        let (a, out_a) = Connection::new();
        let (b, _) = Connection::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(out_a.id(), a.id());
        assert_eq!(a.id().to_string(), a.id().as_uuid().to_string());
    }

    #[test]
    fn close_is_won_once() {
        let (conn, _out) = Connection::new();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.begin_close());
        assert!(!conn.begin_close());
        assert_eq!(conn.state(), ConnectionState::Closing);
        conn.finish_close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.begin_close());
    }

    #[tokio::test]
    async fn deliver_preserves_order() {
        let (conn, mut out) = Connection::new();
        for i in 0..10 {
            conn.deliver(Message::text(i.to_string()), TIMEOUT).await.unwrap();
        }
        for i in 0..10 {
            assert_eq!(out.recv().await, Some(Message::text(i.to_string())));
        }
        assert_eq!(out.try_recv(), None);
    }

    #[tokio::test]
    async fn deliver_to_closed_fails() {
        let (conn, mut out) = Connection::new();
        assert!(conn.begin_close());
        conn.finish_close();
        let err = conn.deliver(Message::text("x"), TIMEOUT).await.unwrap_err();
        assert_eq!(err, DeliveryFailure::Closed);
        assert_eq!(out.try_recv(), None);
    }

    #[tokio::test]
    async fn deliver_without_receiver_fails() {
        let (conn, out) = Connection::new();
        drop(out);
        let err = conn.deliver(Message::text("x"), TIMEOUT).await.unwrap_err();
        assert_eq!(err, DeliveryFailure::ReceiverGone);
    }

    #[tokio::test]
    async fn full_queue_times_out() {
        let (conn, _out) = Connection::with_capacity(1);
        conn.deliver(Message::text("fits"), TIMEOUT).await.unwrap();
        let err = conn
            .deliver(Message::text("blocked"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryFailure::TimedOut);
    }

    #[tokio::test]
    async fn close_wakes_pending_send() {
        let (conn, _out) = Connection::with_capacity(1);
        conn.deliver(Message::text("fits"), TIMEOUT).await.unwrap();

        let closer = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(conn.begin_close());
                conn.finish_close();
            })
        };
        let err = conn
            .deliver(Message::text("blocked"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryFailure::Closed);
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn closed_returns_after_close() {
        let (conn, _out) = Connection::new();
        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closed().await })
        };
        tokio::task::yield_now().await;
        assert!(conn.begin_close());
        conn.finish_close();
        tokio::time::timeout(TIMEOUT, waiter).await.unwrap().unwrap();

        // Already closed: returns immediately.
        tokio::time::timeout(TIMEOUT, conn.closed()).await.unwrap();
    }
}
