//! Client connections.
//!
//! The server spawns one task per accepted socket. That task owns the
//! socket's [`RespCodec`](crate::protocol::RespCodec) and answers requests
//! one at a time until the client goes away or sends bytes that are not
//! RESP.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
