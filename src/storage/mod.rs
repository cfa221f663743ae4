//! Storage Engine Module
//!
//! This module provides the key-value store for TideKV and the background
//! expiry sweeper that reaps entries whose TTL has passed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │            Mutex<HashMap<Bytes, Entry>>                     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ cleanup_expired() every interval
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use tidekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("name"), Bytes::from("tide"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("tide")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageError, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
