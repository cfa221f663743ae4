//! TCP server: store setup, sweeper startup and the accept loop.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{ExpiryConfig, ExpirySweeper, StorageEngine, StorageError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A bound server with its store and running sweeper.
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    sweeper: ExpirySweeper,
}

impl Server {
    /// Creates the store, starts its sweeper and binds the listener.
    ///
    /// The sweeper is running before the first connection can be accepted.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let storage = Arc::new(StorageEngine::new());
        let sweeper = ExpirySweeper::start(
            Arc::clone(&storage),
            ExpiryConfig {
                interval: config.reaper_interval,
            },
        )?;

        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            storage,
            stats: Arc::new(ConnectionStats::new()),
            sweeper,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` completes, then stops the sweeper.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, "Listening");
        }

        tokio::select! {
            _ = accept_loop(&self.listener, &self.storage, &self.stats) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        self.sweeper.shutdown().await;
        info!("Server shutdown complete");
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: &TcpListener,
    storage: &Arc<StorageEngine>,
    stats: &Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(storage));
                let stats = Arc::clone(stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
