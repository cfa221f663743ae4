//! Incremental RESP Protocol Parser
//!
//! This module implements a recursive-descent parser for the RESP2 subset.
//! It works over a byte buffer that may hold a partial message, so the
//! caller can keep appending network data and retry.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! Incomplete input is never an error here. Whether missing bytes mean
//! "wait" or "truncated" is decided by whoever owns the byte stream
//! (see [`crate::protocol::codec`]).

use crate::protocol::types::{
    RespValue, ARRAY_TAG, BULK_STRING_TAG, CRLF, ERROR_TAG, INTEGER_TAG, SIMPLE_STRING_TAG,
};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("invalid or unsupported protocol prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Integer item whose line is not a base-10 i64
    #[error("malformed integer: {0:?}")]
    InvalidInteger(String),

    /// Bulk string or array header whose length is not usable
    #[error("malformed length: {0:?}")]
    InvalidLength(String),

    /// End of stream reached in the middle of an item
    #[error("truncated input")]
    Truncated,

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8 in line")]
    InvalidUtf8,

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// Arrays nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a single header line (type prefix excluded)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// A recursive-descent RESP parser.
///
/// The parser itself holds no buffered data; it is cheap to create and
/// deterministic: parsing the same bytes twice yields the same result.
///
/// # Example
///
/// ```
/// use tidekv::protocol::{RespParser, RespValue};
///
/// let parser = RespParser::new();
/// let (value, consumed) = parser
///     .parse(b"*1\r\n$4\r\nPING\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(consumed, 14);
/// assert_eq!(value, RespValue::array(vec![RespValue::bulk_string("PING")]));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RespParser {
    max_bulk_size: usize,
}

impl RespParser {
    /// Creates a new parser instance with the default bulk size limit.
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Creates a parser that rejects bulk strings longer than `max` bytes.
    pub fn with_max_bulk_size(max: usize) -> Self {
        Self { max_bulk_size: max }
    }

    /// Attempts to parse one RESP value from the front of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&type_byte) = buf.first() else {
            return Ok(None);
        };

        match type_byte {
            SIMPLE_STRING_TAG => {
                Self::parse_text(buf).map(|r| r.map(|(s, n)| (RespValue::SimpleString(s), n)))
            }
            ERROR_TAG => {
                Self::parse_text(buf).map(|r| r.map(|(s, n)| (RespValue::Error(s), n)))
            }
            INTEGER_TAG => Self::parse_integer(buf),
            BULK_STRING_TAG => self.parse_bulk_string(buf),
            ARRAY_TAG => self.parse_array(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses the payload of `+<text>\r\n` or `-<text>\r\n`.
    fn parse_text(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
        let Some((line, consumed)) = read_line(buf)? else {
            return Ok(None);
        };
        let s = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        Ok(Some((s.to_string(), consumed)))
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((line, consumed)) = read_line(buf)? else {
            return Ok(None);
        };
        let n = parse_decimal(line)
            .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
        Ok(Some((RespValue::Integer(n), consumed)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((length, header_len)) = read_length(buf)? else {
            return Ok(None);
        };

        // Null bulk string: nothing follows the header
        if length == -1 {
            return Ok(Some((RespValue::BulkString(None), header_len)));
        }

        if length < 0 {
            return Err(ParseError::InvalidLength(length.to_string()));
        }

        let length = length as usize;
        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let total_needed = header_len + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        let data_end = header_len + length;
        if &buf[data_end..total_needed] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[header_len..data_end]);
        Ok(Some((RespValue::BulkString(Some(data)), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let Some((count, header_len)) = read_length(buf)? else {
            return Ok(None);
        };

        // `*-1` (null array), `*0` and any other non-positive count all
        // decode to the empty array.
        if count <= 0 {
            return Ok(Some((RespValue::Array(Vec::new()), header_len)));
        }

        let count = count as usize;
        // Every element takes at least 3 bytes, so a huge count cannot
        // pre-allocate more than the buffer could ever describe.
        let mut elements = Vec::with_capacity(count.min(buf.len() / 3 + 1));
        let mut consumed = header_len;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the line following the type prefix byte.
///
/// Returns the line content (without prefix and CRLF) and the total number of
/// bytes it occupies, including both.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&[u8], usize)>> {
    let body = &buf[1..];
    match find_crlf(body) {
        Some(pos) => Ok(Some((&body[..pos], 1 + pos + CRLF.len()))),
        None if body.len() > MAX_LINE_LENGTH => Err(ParseError::MessageTooLarge {
            size: body.len(),
            max: MAX_LINE_LENGTH,
        }),
        None => Ok(None),
    }
}

/// Reads a `$` or `*` header line as a signed length.
fn read_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let Some((line, consumed)) = read_line(buf)? else {
        return Ok(None);
    };
    let n = parse_decimal(line)
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(line).into_owned()))?;
    Ok(Some((n, consumed)))
}

/// Base-10 with an optional leading `-`. `str::parse` would also take `+`.
fn parse_decimal(line: &[u8]) -> Option<i64> {
    if line.first() == Some(&b'+') {
        return None;
    }
    std::str::from_utf8(line).ok()?.parse().ok()
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single RESP message from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
