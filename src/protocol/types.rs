//! Protocol items and their wire encoding.
//!
//! TideKV speaks the RESP2 subset made of five item kinds. Every item starts
//! with a one-byte tag and every line ends in `\r\n`:
//!
//! | Tag | Item          | Example                          |
//! |-----|---------------|----------------------------------|
//! | `+` | simple string | `+OK\r\n`                        |
//! | `-` | error         | `-ERR syntax error\r\n`          |
//! | `:` | integer       | `:42\r\n`                        |
//! | `$` | bulk string   | `$3\r\nfoo\r\n`, null `$-1\r\n`  |
//! | `*` | array         | `*1\r\n$4\r\nPING\r\n`           |

use bytes::Bytes;

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

pub(crate) const SIMPLE_STRING_TAG: u8 = b'+';
pub(crate) const ERROR_TAG: u8 = b'-';
pub(crate) const INTEGER_TAG: u8 = b':';
pub(crate) const BULK_STRING_TAG: u8 = b'$';
pub(crate) const ARRAY_TAG: u8 = b'*';

/// One protocol item, as decoded from or encoded to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Text without CR or LF.
    SimpleString(String),
    /// Error text without CR or LF. Replies start with `ERR `.
    Error(String),
    Integer(i64),
    /// Binary-safe payload. `None` is the null bulk string, which is not
    /// the same thing as an empty payload.
    BulkString(Option<Bytes>),
    /// Possibly nested. `*-1` decodes to an empty array as well.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        RespValue::Error(msg.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// A present bulk string.
    ///
    /// ```
    /// use tidekv::protocol::RespValue;
    ///
    /// assert_eq!(RespValue::bulk_string("hi").encode(), b"$2\r\nhi\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// The null bulk string, used for "no such key".
    pub fn null() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(items)
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// The tag byte this item is introduced by on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            RespValue::SimpleString(_) => SIMPLE_STRING_TAG,
            RespValue::Error(_) => ERROR_TAG,
            RespValue::Integer(_) => INTEGER_TAG,
            RespValue::BulkString(_) => BULK_STRING_TAG,
            RespValue::Array(_) => ARRAY_TAG,
        }
    }

    /// Encodes the item into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        self.encode_into(&mut out);
        out
    }

    /// Appends the encoded item to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            RespValue::SimpleString(text) | RespValue::Error(text) => write_text(out, text),
            RespValue::Integer(n) => out.extend_from_slice(n.to_string().as_bytes()),
            RespValue::BulkString(None) => out.extend_from_slice(b"-1"),
            RespValue::BulkString(Some(data)) => {
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(CRLF);
                out.extend_from_slice(data);
            }
            RespValue::Array(items) => {
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(CRLF);
                for item in items {
                    item.encode_into(out);
                }
                // Each element already wrote its own terminator
                return;
            }
        }
        out.extend_from_slice(CRLF);
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::BulkString(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Payload of a present bulk string; `None` for anything else.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            _ => None,
        }
    }
}

/// Writes a line payload, turning CR and LF into spaces so the item
/// always occupies exactly one line.
fn write_text(out: &mut Vec<u8>, text: &str) {
    out.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(RespValue::ok().encode(), b"+OK\r\n");
        assert_eq!(RespValue::pong().encode(), b"+PONG\r\n");
        assert_eq!(
            RespValue::error("ERR syntax error").encode(),
            b"-ERR syntax error\r\n"
        );
        assert_eq!(RespValue::integer(0).encode(), b":0\r\n");
        assert_eq!(RespValue::integer(i64::MIN).encode(), b":-9223372036854775808\r\n");
    }

    #[test]
    fn test_null_and_empty_bulk_differ() {
        let null = RespValue::null();
        let empty = RespValue::bulk_string(Bytes::new());

        assert_eq!(null.encode(), b"$-1\r\n");
        assert_eq!(empty.encode(), b"$0\r\n\r\n");
        assert!(null.is_null());
        assert!(!empty.is_null());
    }

    #[test]
    fn test_bulk_payload_is_opaque() {
        // CRLF and NUL inside the payload are not special
        let value = RespValue::bulk_string(Bytes::from_static(b"x\r\n\0y"));
        assert_eq!(value.encode(), b"$5\r\nx\r\n\0y\r\n");
    }

    #[test]
    fn test_encode_nested_array() {
        let value = RespValue::array(vec![
            RespValue::bulk_string("a"),
            RespValue::array(vec![]),
            RespValue::array(vec![RespValue::null(), RespValue::integer(7)]),
        ]);
        assert_eq!(value.encode(), b"*3\r\n$1\r\na\r\n*0\r\n*2\r\n$-1\r\n:7\r\n");
    }

    #[test]
    fn test_encode_into_appends() {
        let mut out = b"+PONG\r\n".to_vec();
        RespValue::null().encode_into(&mut out);
        assert_eq!(out, b"+PONG\r\n$-1\r\n");
    }

    #[test]
    fn test_line_breaks_in_text_are_flattened() {
        assert_eq!(
            RespValue::error("ERR bad\r\n+OK").encode(),
            b"-ERR bad  +OK\r\n"
        );
        assert_eq!(RespValue::simple_string("a\nb").encode(), b"+a b\r\n");
    }

    #[test]
    fn test_tags() {
        assert_eq!(RespValue::ok().tag(), b'+');
        assert_eq!(RespValue::error("ERR").tag(), b'-');
        assert_eq!(RespValue::integer(1).tag(), b':');
        assert_eq!(RespValue::null().tag(), b'$');
        assert_eq!(RespValue::array(vec![]).tag(), b'*');
    }

    #[test]
    fn test_as_bulk() {
        assert_eq!(RespValue::bulk_string("k").as_bulk(), Some(&Bytes::from("k")));
        assert_eq!(RespValue::null().as_bulk(), None);
        assert_eq!(RespValue::simple_string("k").as_bulk(), None);
    }
}
