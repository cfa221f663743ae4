//! The key-value store and its expiry rules.
//!
//! This module implements the key-value store behind TideKV: a map from
//! key to [`Entry`] guarded by a single mutex, with per-key TTL.
//!
//! ## Expiry
//!
//! An entry is either permanent or carries an absolute deadline. Expired
//! entries are removed on two paths that share [`Entry::is_alive_at`]:
//!
//! 1. **Lazy**: `get` deletes an expired entry instead of returning it.
//! 2. **Active**: [`StorageEngine::cleanup_expired`] removes every expired
//!    entry in one pass; the background sweeper calls it on a timer.
//!
//! Only the lazy path is needed for correctness. The active path bounds
//! memory for keys that are never read again.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              StorageEngine               │
//! │   Mutex<HashMap<Bytes, Entry>>           │
//! │     ▲            ▲             ▲         │
//! │    SET          GET       sweeper pass   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Every `set`, `get` (including its lazy delete) and every sweeper pass
//! holds the lock for its whole critical section and does no I/O under it.
//! Point operations are O(1); a sweeper pass is O(n).

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A stored value with an optional expiry deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = permanent)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a permanent entry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires `ttl` from now.
    ///
    /// A zero `ttl` means "no TTL" and yields a permanent entry.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        if ttl.is_zero() {
            return Self::new(value);
        }
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Returns true if this entry never expires.
    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Returns true if the entry is still visible at `now`.
    ///
    /// An entry set with TTL `d` at time `t` is alive for reads strictly
    /// before `t + d`.
    #[inline]
    pub fn is_alive_at(&self, now: Instant) -> bool {
        match self.expires_at {
            None => true,
            Some(deadline) => now < deadline,
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.is_alive_at(Instant::now())
    }
}

/// Counters describing store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries physically present, expired-but-unreaped included
    pub keys: u64,
    pub gets: u64,
    pub sets: u64,
    /// Entries removed by a `get` that found them expired
    pub lazily_expired: u64,
    /// Entries removed by a sweeper pass
    pub actively_expired: u64,
}

/// Errors reported by the storage layer.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("an expiry sweeper is already running for this store")]
    SweeperAlreadyRunning,

    #[error("expiry sweep interval must be non-zero")]
    InvalidInterval,
}

/// The key-value store.
///
/// Wrap it in an `Arc` and hand clones to every connection and to the
/// sweeper. There is no global instance; tests build as many as they need.
///
/// # Example
///
/// ```
/// use tidekv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("tide"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("tide")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.get(b"session").is_some());
/// ```
pub struct StorageEngine {
    data: Mutex<HashMap<Bytes, Entry>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    lazy_expired_count: AtomicU64,
    active_expired_count: AtomicU64,

    /// Set while an `ExpirySweeper` is attached to this store
    sweeper_attached: AtomicBool,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("sweeper_attached", &self.sweeper_attached.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            lazy_expired_count: AtomicU64::new(0),
            active_expired_count: AtomicU64::new(0),
            sweeper_attached: AtomicBool::new(false),
        }
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Any existing entry for the key is overwritten, TTL included.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key-value pair that expires after `ttl`.
    ///
    /// A zero `ttl` stores the value permanently.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl))
    }

    fn insert(&self, key: Bytes, entry: Entry) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.data.lock().insert(key, entry).is_none()
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is deleted as part of the read.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut data = self.data.lock();

        let entry = data.get(key)?;
        if entry.is_alive_at(now) {
            return Some(entry.value.clone());
        }

        data.remove(key);
        drop(data);

        self.lazy_expired_count.fetch_add(1, Ordering::Relaxed);
        debug!("Lazily expired key on read");
        None
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Permanent entries are never touched.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut data = self.data.lock();

        let before = data.len();
        data.retain(|_, entry| entry.is_alive_at(now));
        let removed = (before - data.len()) as u64;
        drop(data);

        if removed > 0 {
            self.active_expired_count
                .fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries physically present.
    ///
    /// Entries that expired but were not yet removed by a read or a sweep
    /// are counted.
    pub fn len(&self) -> u64 {
        self.data.lock().len() as u64
    }

    /// Returns true if no entries are physically present.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns a snapshot of the store counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            lazily_expired: self.lazy_expired_count.load(Ordering::Relaxed),
            actively_expired: self.active_expired_count.load(Ordering::Relaxed),
        }
    }

    /// Marks the store as having a live sweeper.
    pub(crate) fn attach_sweeper(&self) -> Result<(), StorageError> {
        self.sweeper_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| StorageError::SweeperAlreadyRunning)
    }

    pub(crate) fn detach_sweeper(&self) {
        self.sweeper_attached.store(false, Ordering::Release);
    }

    /// Returns true while an `ExpirySweeper` is running against this store.
    pub fn has_sweeper(&self) -> bool {
        self.sweeper_attached.load(Ordering::Acquire)
    }
}
