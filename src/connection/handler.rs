//! Per-client request loop.
//!
//! Each client gets its own task that runs a strictly serial loop:
//! decode one request, dispatch it, write the reply, repeat.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. accept() hands over a TcpStream
//!        │
//!        ▼
//! 2. ConnectionHandler spawned (one RespCodec per connection)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  decode ─> dispatch ─> reply │ <─┐
//!    └──────────────┬───────────────┘   │
//!                   └───────────────────┘
//!        │
//!        ▼
//! 4. Clean EOF between requests  -> graceful close
//!    Decode error / I/O error    -> close without reply
//! ```
//!
//! Replies go out in request order. Command validation errors are replies,
//! not connection errors, so they never end the loop.

use crate::commands::CommandHandler;
use crate::protocol::{DecodeError, RespCodec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Server-wide connection counters, shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    /// Gauge: incremented on open, decremented on close
    pub active_connections: AtomicU64,
    /// Requests answered, error replies included
    pub commands_processed: AtomicU64,
    /// Connections closed because of undecodable input
    pub protocol_errors: AtomicU64,
    /// Reply bytes flushed to clients
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        Self::bump(&self.connections_accepted, 1);
        Self::bump(&self.active_connections, 1);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        Self::bump(&self.commands_processed, 1);
    }

    pub fn protocol_error(&self) {
        Self::bump(&self.protocol_errors, 1);
    }

    pub fn bytes_written(&self, count: usize) {
        Self::bump(&self.bytes_written, count as u64);
    }
}

/// Handles a single client connection.
///
/// Generic over the two halves of the byte stream so it can run on a TCP
/// socket or on an in-memory pipe.
pub struct ConnectionHandler<R, W> {
    /// Decoder over the read half
    codec: RespCodec<R>,

    /// Buffered write half
    writer: BufWriter<W>,

    /// Peer address, used only in log fields
    addr: SocketAddr,

    /// The command handler (shared store behind it)
    command_handler: CommandHandler,

    /// Reused reply buffer
    reply: Vec<u8>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps the two stream halves. Counts the connection as opened.
    pub fn new(
        reader: R,
        writer: W,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            codec: RespCodec::new(reader),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
            reply: Vec::with_capacity(256),
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Returns `Ok(())` when the client disconnects between requests.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Decode(DecodeError::Protocol(e))) => {
                self.stats.protocol_error();
                warn!(client = %self.addr, error = %e, "Protocol error, closing connection");
            }
            Err(e) if e.is_connection_reset() => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The decode-dispatch-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(request) = self.codec.decode().await? {
            self.reply.clear();
            self.command_handler.handle(request, &mut self.reply);
            self.stats.command_processed();
            self.send_reply().await?;
        }
        Ok(())
    }

    /// Writes the pending reply and flushes it.
    async fn send_reply(&mut self) -> Result<(), ConnectionError> {
        self.writer.write_all(&self.reply).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(self.reply.len());
        trace!(
            client = %self.addr,
            bytes = self.reply.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Writing the reply failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reading or decoding the next request failed
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl ConnectionError {
    fn is_connection_reset(&self) -> bool {
        let io_err = match self {
            ConnectionError::IoError(e) | ConnectionError::Decode(DecodeError::Io(e)) => e,
            ConnectionError::Decode(DecodeError::Protocol(_)) => return false,
        };
        matches!(
            io_err.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
        )
    }
}

/// Handles a client TCP connection to completion.
///
/// Errors are logged by the handler; the socket is closed when this returns.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let (reader, writer) = stream.into_split();
    let handler = ConnectionHandler::new(reader, writer, addr, command_handler, stats);
    let _ = handler.run().await;
}
