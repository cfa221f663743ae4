//! # TideKV - A Small In-Memory Key-Value Server
//!
//! TideKV speaks the RESP2 wire protocol, so `redis-cli` and other Redis
//! clients can talk to it. It stores binary-safe string values with an
//! optional per-key time-to-live.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              TideKV                                 │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌──────────────────────┐     │
//! │                     │ RespCodec   │    │   StorageEngine      │     │
//! │                     │ (per conn)  │    │ Mutex<HashMap>       │     │
//! │                     └─────────────┘    └──────────▲───────────┘     │
//! │                                                   │                 │
//! │                                        ┌──────────┴───────────┐     │
//! │                                        │   ExpirySweeper      │     │
//! │                                        └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tidekv::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser, encoder and per-connection codec
//! - [`storage`]: Thread-safe store with TTL and the background sweeper
//! - [`commands`]: Request validation and dispatch
//! - [`connection`]: Per-client request loop
//! - [`server`]: Accept loop and startup
//! - [`config`]: Command-line configuration
//!
//! ## Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: a read that finds an expired key deletes it and misses
//! 2. **Active**: a background task periodically removes expired keys
//!
//! Both use the same liveness check, so they never disagree.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandError, CommandHandler};
pub use config::{Cli, Config};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{DecodeError, ParseError, RespCodec, RespParser, RespValue};
pub use server::{Server, ServerError};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port TideKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host TideKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
