//! Command Handler Module
//!
//! This module implements the dispatcher for TideKV. It takes one decoded
//! request item, validates it into a [`Command`], executes it against the
//! storage engine and produces the reply item.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ from_frame()│───>│  execute()  │───>│  encode()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                            ▼                                │
//! │                      StorageEngine                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation errors never close the connection: they become `-ERR ...`
//! replies and the caller keeps reading requests.

use crate::commands::command::Command;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::{debug, trace};

/// Handles Redis commands by dispatching them to the appropriate handlers.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Returns the store this handler executes against.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request and returns the reply.
    pub fn execute(&self, request: RespValue) -> RespValue {
        match Command::from_frame(request) {
            Ok(command) => {
                trace!(command = command.name(), "Executing command");
                self.dispatch(command)
            }
            Err(e) => {
                debug!(error = %e, "Rejected command");
                RespValue::error(e.to_string())
            }
        }
    }

    /// Executes a request and appends the encoded reply to `out`.
    ///
    /// Exactly one reply is written per request.
    pub fn handle(&self, request: RespValue, out: &mut Vec<u8>) {
        self.execute(request).encode_into(out);
    }

    fn dispatch(&self, command: Command) -> RespValue {
        match command {
            Command::Ping(None) => RespValue::pong(),
            Command::Ping(Some(message)) | Command::Echo(message) => {
                RespValue::bulk_string(message)
            }
            Command::Set { key, value, ttl } => {
                match ttl {
                    Some(ttl) => self.storage.set_with_ttl(key, value, ttl),
                    None => self.storage.set(key, value),
                };
                RespValue::ok()
            }
            Command::Get(key) => match self.storage.get(&key) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },
        }
    }
}
