//! JSON-RPC message types.
//!
//! This crate contains the data model shared by the client: requests,
//! responses, their correlation identifiers and the generators that assign
//! identifiers to outgoing requests.
//!
//! Encoding these types onto a wire is left to the connection
//! implementation; they only derive `serde` traits.

mod id;
mod message;

pub use id::{Id, IdGenerator, SequentialIds, UuidIds};
pub use message::{JSONRPC_VERSION, Request, Response, RpcError};
