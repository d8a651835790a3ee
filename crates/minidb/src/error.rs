//! Error types for the application layer.

use minidb_core::{CoreError, ErrorKind};
use minidb_realtime::RealtimeError;
use thiserror::Error;

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced to application handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Connection registry error.
    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    /// Returns the HTTP status code a handler would answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Core(err) => match err.kind() {
                ErrorKind::ValueTooLarge => 413,
                ErrorKind::TypeMismatch | ErrorKind::EncodeError | ErrorKind::UnsupportedType => 400,
                ErrorKind::HandleClosed | ErrorKind::Locked => 503,
                ErrorKind::Io | ErrorKind::CorruptStore | ErrorKind::CorruptRecord => 500,
            },
            Self::Realtime(err) if err.is_connection_closed() => 410,
            Self::Realtime(_) => 502,
            Self::Join(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
