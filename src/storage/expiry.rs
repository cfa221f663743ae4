//! Active expiry.
//!
//! [`ExpirySweeper`] owns a Tokio task that calls
//! [`StorageEngine::cleanup_expired`] once per tick. Reads already hide
//! expired entries, so the sweeper only bounds memory held by keys that
//! nobody reads again.
//!
//! A store accepts one live sweeper at a time. The claim is taken in
//! [`ExpirySweeper::start`] and released when the task exits, not when the
//! handle is dropped, so `shutdown().await` followed by `start` never races.

use crate::storage::engine::{StorageEngine, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between two sweep passes. Must be non-zero.
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Handle to a running sweeper. Dropping it cancels the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweeper for `engine` on the current Tokio runtime.
    ///
    /// Fails with [`StorageError::InvalidInterval`] for a zero interval, and
    /// with [`StorageError::SweeperAlreadyRunning`] while another sweeper is
    /// attached to the same store.
    ///
    /// ```ignore
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&engine), ExpiryConfig::default())?;
    /// // ...
    /// sweeper.shutdown().await;
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Result<Self, StorageError> {
        if config.interval.is_zero() {
            return Err(StorageError::InvalidInterval);
        }
        engine.attach_sweeper()?;
        let claim = Claim(engine);

        let (cancel, cancelled) = watch::channel(false);
        let interval = config.interval;
        let task = tokio::spawn(run(claim, interval, cancelled));

        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");

        Ok(Self {
            cancel,
            task: Some(task),
        })
    }

    /// Asks the task to stop and returns immediately.
    pub fn stop(&self) {
        // send_if_modified keeps repeated stops quiet
        let first = self.cancel.send_if_modified(|stopped| !std::mem::replace(stopped, true));
        if first {
            info!("Expiry sweeper stopping");
        }
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The store's sweeper slot, held by the task for its whole life.
struct Claim(Arc<StorageEngine>);

impl Drop for Claim {
    fn drop(&mut self) {
        self.0.detach_sweeper();
    }
}

async fn run(claim: Claim, interval: Duration, mut cancelled: watch::Receiver<bool>) {
    let engine = &claim.0;

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancelled.changed() => {
                // Err means the handle is gone without calling stop
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
                continue;
            }
        }

        let removed = engine.cleanup_expired();
        if removed == 0 {
            trace!("Sweep removed nothing");
        } else {
            debug!(expired = removed, keys_remaining = engine.len(), "Sweep removed expired keys");
        }
    }

    debug!("Expiry sweeper exited");
}

/// [`ExpirySweeper::start`] with [`ExpiryConfig::default`].
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> Result<ExpirySweeper, StorageError> {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const TICK: Duration = Duration::from_millis(10);

    fn every_tick() -> ExpiryConfig {
        ExpiryConfig { interval: TICK }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_keys_are_reclaimed() {
        let engine = Arc::new(StorageEngine::new());
        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("session:{}", i)),
                Bytes::from_static(b"token"),
                Duration::from_millis(50),
            );
        }
        engine.set(Bytes::from_static(b"config"), Bytes::from_static(b"on"));

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.actively_expired, 10);
        assert_eq!(stats.lazily_expired, 0);
        assert_eq!(stats.gets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_keys_untouched_by_sweeps() {
        let engine = Arc::new(StorageEngine::new());
        engine.set_with_ttl(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
            Duration::from_secs(60),
        );

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(engine.get(b"k"), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let engine = Arc::new(StorageEngine::new());
        drop(ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap());

        // Let the task observe the cancellation
        tokio::time::sleep(TICK).await;
        assert!(!engine.has_sweeper());

        engine.set_with_ttl(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
            Duration::from_millis(5),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nothing reclaimed it, but reads still miss
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(b"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sweeper_per_store() {
        let engine = Arc::new(StorageEngine::new());

        let first = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap();
        let err = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap_err();
        assert_eq!(err, StorageError::SweeperAlreadyRunning);

        first.shutdown().await;
        assert!(!engine.has_sweeper());

        let _again = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap();
        assert!(engine.has_sweeper());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let engine = Arc::new(StorageEngine::new());

        let err = ExpirySweeper::start(
            Arc::clone(&engine),
            ExpiryConfig {
                interval: Duration::ZERO,
            },
        )
        .unwrap_err();

        assert_eq!(err, StorageError::InvalidInterval);
        // The store was never claimed
        assert!(!engine.has_sweeper());
        let _sweeper = start_expiry_sweeper(Arc::clone(&engine)).unwrap();
        assert!(engine.has_sweeper());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let engine = Arc::new(StorageEngine::new());
        let sweeper = ExpirySweeper::start(Arc::clone(&engine), every_tick()).unwrap();

        sweeper.stop();
        sweeper.stop();
        sweeper.shutdown().await;

        assert!(!engine.has_sweeper());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stores_are_swept_independently() {
        let short = Arc::new(StorageEngine::new());
        let plain = Arc::new(StorageEngine::new());

        let _a = ExpirySweeper::start(Arc::clone(&short), every_tick()).unwrap();
        let _b = ExpirySweeper::start(Arc::clone(&plain), every_tick()).unwrap();

        short.set_with_ttl(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
            Duration::from_millis(5),
        );
        plain.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"));

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(short.len(), 0);
        assert_eq!(plain.len(), 1);
    }
}
