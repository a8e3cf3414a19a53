//! JSON-RPC client session
//!
//! This crate correlates requests sent over a single asynchronous
//! connection with the responses that come back on it, in whatever order
//! they arrive.
//!
//! # Architecture
//!
//! - [`Session`] assigns request ids, registers each request and writes it
//!   to the [`Connection`]
//! - a background receive loop reads responses and resolves the matching
//!   request by id
//! - [`ResponseFuture`] is the caller's handle to one request's outcome
//! - [`Session::close`], or the connection closing, resolves every request
//!   still pending with [`Error::Closed`]
//!
//! Encoding messages and establishing the underlying link are left to
//! implementations of [`Connection`] and [`Dialer`].
//!
//! # Usage
//!
//! ```ignore
//! let session = Session::new(dialer);
//! session.connect().await?;
//!
//! let response = session.send(Request::new("ping", None)).await?;
//!
//! let cancel = CancellationToken::new();
//! let response = session.send_with_cancel(&cancel, Request::new("slow", None)).await?;
//!
//! session.close().await?;
//! ```

mod config;
mod connection;
mod error;
mod receive_loop;
mod session;
mod slot;
mod state;
mod table;

pub mod testing;

pub use config::ClientConfig;
pub use connection::{Connection, Dialer};
pub use error::{ConnectionError, Error, Result};
pub use messages::{Id, IdGenerator, Request, Response, RpcError, SequentialIds, UuidIds};
pub use session::{Session, SessionBuilder};
pub use slot::{Outcome, ResponseFuture};
pub use state::SessionState;
pub use tokio_util::sync::CancellationToken;
