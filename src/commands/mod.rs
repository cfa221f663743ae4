//! Request validation and execution.
//!
//! Decoded requests are first checked by [`Command::from_frame`], then run
//! against the store by [`CommandHandler`].
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Codec     │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Command         │  validate: array, name, arity, argument types
//! ├─────────────────┤
//! │ CommandHandler  │  execute and build the reply
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
