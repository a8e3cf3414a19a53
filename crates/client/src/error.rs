//! Error types for the client.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use messages::Id;

/// Errors reported by a [`Connection`](crate::Connection) or
/// [`Dialer`](crate::Dialer).
///
/// Errors are cheap to clone so that a single failure can be handed to
/// every observer of a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// The connection has terminated. Reading from it again will not
    /// produce further messages.
    #[error("connection has been closed")]
    Closed,

    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Any other transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(Arc::new(e))
    }
}

/// Errors returned from [`Session`](crate::Session) operations and
/// delivered to pending requests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Establishing the connection failed.
    #[error("failed to dial connection: {0}")]
    Dial(#[source] ConnectionError),

    /// The session has been closed.
    #[error("session has been closed")]
    Closed,

    /// Writing this request to the connection failed.
    #[error("failed to write request: {0}")]
    Write(#[source] ConnectionError),

    /// The caller stopped waiting for the response.
    #[error("request cancelled")]
    Cancelled,

    /// No response arrived within the caller supplied deadline.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    /// A request was sent before the session was connected.
    #[error("session is not connected")]
    NotConnected,

    /// `connect` was called on a session that is connecting or connected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// Another request with the same identifier is still pending.
    #[error("a request with id {0} is already pending")]
    DuplicateId(Id),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
