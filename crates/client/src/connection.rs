//! Connection abstraction consumed by the session
//!
//! The session does not know how requests and responses are encoded or how
//! the underlying link is established. It only needs something that can be
//! dialed and then read from and written to concurrently:
//!
//! - [`Dialer`] opens a new [`Connection`]
//! - [`Connection::read`] is called in a loop by a single background task
//! - [`Connection::write`] may be called by many callers at once
//!
//! # Example
//!
//! ```
//! use client::testing::MemoryDialer;
//! use client::Session;
//!
//! # async fn example() -> Result<(), client::Error> {
//! let (dialer, _peer) = MemoryDialer::pair();
//! let session = Session::new(dialer);
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use messages::{Request, Response};

use crate::error::ConnectionError;

/// A bidirectional, ordered message connection.
///
/// Both methods take `&self`: the read loop and any number of senders share
/// the connection, so implementations must handle their own interior
/// synchronisation.
pub trait Connection: Send + Sync + 'static {
    /// Wait for the next inbound response.
    ///
    /// Must return [`ConnectionError::Closed`] once the connection has
    /// terminated, and keep returning it on later calls.
    fn read(&self) -> impl Future<Output = Result<Response, ConnectionError>> + Send;

    /// Send one request.
    fn write(&self, request: &Request) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Release the connection.
    ///
    /// Called at most once, when the session shuts down. By then the read
    /// loop has stopped reading and no write is in flight. A session that
    /// is dropped without being closed drops the connection without
    /// calling this.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Something that can open a [`Connection`]
pub trait Dialer: Send + Sync + 'static {
    type Connection: Connection;

    fn dial(&self) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}
