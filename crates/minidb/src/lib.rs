//! # MiniDB
//!
//! Async front end for the MiniDB storage engine, composed with a realtime
//! connection registry.
//!
//! - [`Store`]: cloneable async handle over a [`minidb_core::Database`]
//! - [`App`]: a store plus the set of connected clients, with
//!   [`App::persist_and_broadcast`] for the common "save then push" handler
//! - [`AppError`]: one error type for handlers, with HTTP status mapping
//!
//! ## Example
//!
//! ```rust
//! use minidb::{App, Store};
//! use minidb::ConnectionRegistry;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> minidb::AppResult<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let store = Store::open(dir.path().join("chat.db"), minidb::Config::default()).await?;
//! let app = App::new(store, Arc::new(ConnectionRegistry::new()));
//!
//! let doc = serde_json::json!({"user": "Alice", "text": "hi"});
//! let published = app.persist_and_broadcast("msg:1", doc).await?;
//! assert_eq!(published.report.delivered, 0);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod error;
mod store;

pub use app::{App, Published};
pub use error::{AppError, AppResult};
pub use store::Store;

pub use minidb_core::{Config, Database, SequenceNumber, Value};
pub use minidb_realtime::{ConnectionId, ConnectionRegistry, Message};
