//! Per-connection RESP decoder.
//!
//! [`RespCodec`] owns the read side of a byte stream together with the
//! buffer of bytes received but not yet decoded. One codec is created per
//! connection and never shared, so no state crosses connections.
//!
//! `decode()` distinguishes three outcomes:
//!
//! - `Ok(Some(item))` - one complete item was decoded
//! - `Ok(None)` - the peer closed the stream cleanly between items
//! - `Err(_)` - an I/O failure, a malformed item, or end-of-stream in the
//!   middle of an item ([`ParseError::Truncated`])

use crate::protocol::parser::{ParseError, RespParser};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors returned by [`RespCodec::decode`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The bytes on the wire are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stateful RESP decoder bound to one byte stream.
#[derive(Debug)]
pub struct RespCodec<R> {
    reader: R,
    buffer: BytesMut,
    parser: RespParser,
}

impl<R: AsyncRead + Unpin> RespCodec<R> {
    /// Creates a codec reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self::with_parser(reader, RespParser::new())
    }

    /// Creates a codec that decodes with a custom parser configuration.
    pub fn with_parser(reader: R, parser: RespParser) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser,
        }
    }

    /// Decodes the next item from the stream.
    ///
    /// Bytes beyond the returned item stay buffered for the next call.
    pub async fn decode(&mut self) -> Result<Option<RespValue>, DecodeError> {
        loop {
            // Each attempt reparses from the start of the buffer, so an item
            // split into k reads costs k parses. Requests here are small;
            // a resumable parser would only pay off for large arrays.
            if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded item"
                );
                return Ok(Some(value));
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.reader.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ParseError::Truncated.into())
                };
            }
            trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        }
    }

    /// Number of received bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
