//! RESP Protocol Implementation
//!
//! This module provides the wire codec for the RESP2 subset TideKV speaks.
//! It has no knowledge of commands or storage.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental recursive-descent parser over a byte buffer
//! - `codec`: Per-connection decoder over an async byte stream
//!
//! ## Example
//!
//! ```
//! use tidekv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (_request, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("tide"));
//! assert_eq!(response.encode(), b"$4\r\ntide\r\n");
//! ```

pub mod codec;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use codec::{DecodeError, RespCodec};
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
