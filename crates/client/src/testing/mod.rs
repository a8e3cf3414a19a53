//! Testing utilities for code built on the client.
//!
//! This module provides an in-memory [`Connection`](crate::Connection) whose
//! remote end is driven directly by the test, so the correlation logic can be
//! exercised without a real transport.
//!
//! # Example
//!
//! ```
//! use client::testing::MemoryDialer;
//! use client::{Request, Session};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), client::Error> {
//! let (dialer, mut peer) = MemoryDialer::pair();
//! let session = Session::new(dialer);
//! session.connect().await?;
//!
//! let pending = session.send_async(Request::new("ping", None)).await;
//! let request = peer.next_request().await.unwrap();
//! peer.reply(&request, json!("pong"));
//!
//! let response = pending.wait().await?;
//! assert_eq!(response.result, Some(json!("pong")));
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::{MemoryConnection, MemoryDialer, MemoryPeer, pair};
