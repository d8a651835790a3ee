//! # MiniDB Realtime
//!
//! Connection registry for pushing messages to live clients.
//!
//! The registry tracks the set of open client channels and fans messages
//! out to them:
//!
//! - `connect` / `disconnect` are idempotent
//! - `broadcast` enumerates a snapshot of the members and never fails
//! - members whose delivery fails are removed automatically
//! - each connection receives messages in the order they were sent
//!
//! The [`socket`] module wires a registry to `tokio-tungstenite` WebSocket
//! streams.
//!
//! ## Example
//!
//! ```rust,no_run
//! use minidb_realtime::{socket, ConnectionRegistry, Message};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> minidb_realtime::RealtimeResult<()> {
//! let registry = Arc::new(ConnectionRegistry::new());
//! let listener = TcpListener::bind("127.0.0.1:9001").await?;
//!
//! // Echo every message to every client.
//! let sockets = Arc::clone(&registry);
//! socket::run(listener, registry, move |_id, message: Message| {
//!     let sockets = Arc::clone(&sockets);
//!     async move {
//!         sockets.broadcast(message).await;
//!     }
//! })
//! .await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod message;
mod registry;
pub mod socket;

pub use connection::{Connection, ConnectionId, ConnectionState, Outbound, OUTBOUND_CAPACITY};
pub use error::{RealtimeError, RealtimeResult};
pub use message::Message;
pub use registry::{BroadcastReport, ConnectionRegistry, RegistryStats, SEND_TIMEOUT};
pub use socket::ConnectionGuard;
