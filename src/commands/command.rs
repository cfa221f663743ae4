//! Command validation.
//!
//! A request frame is turned into a [`Command`] before anything touches the
//! store. All arity and argument checks live here, so execution only ever
//! sees well-formed invocations.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Recoverable validation failures.
///
/// The `Display` text is the exact error reply sent to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR commands must be sent as arrays")]
    NotArray,

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR invalid command format")]
    InvalidFormat,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR '{0}' arguments must be bulk strings")]
    NotBulkString(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
}

/// A validated command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING [message]`
    Ping(Option<Bytes>),
    /// `ECHO message`
    Echo(Bytes),
    /// `SET key value [PX milliseconds]`
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// `GET key`
    Get(Bytes),
}

impl Command {
    /// Validates a decoded request frame.
    ///
    /// The command name is matched case-insensitively.
    pub fn from_frame(frame: RespValue) -> Result<Command, CommandError> {
        let args = match frame {
            RespValue::Array(args) => args,
            RespValue::SimpleString(_)
            | RespValue::Error(_)
            | RespValue::Integer(_)
            | RespValue::BulkString(_) => return Err(CommandError::NotArray),
        };

        let (name, args) = args.split_first().ok_or(CommandError::EmptyCommand)?;
        let name = name.as_bulk().ok_or(CommandError::InvalidFormat)?;

        match name.to_ascii_uppercase().as_slice() {
            b"PING" => parse_ping(args),
            b"ECHO" => parse_echo(args),
            b"SET" => parse_set(args),
            b"GET" => parse_get(args),
            _ => Err(CommandError::UnknownCommand(printable_name(name))),
        }
    }

    /// Upper-case command name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get(_) => "GET",
        }
    }
}

/// The command name as it will be echoed in an error line, with CR and LF
/// replaced by spaces.
fn printable_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).replace(['\r', '\n'], " ")
}

/// Extracts the payload of a non-null bulk string argument.
fn bulk_arg(value: &RespValue, command: &'static str) -> Result<Bytes, CommandError> {
    value
        .as_bulk()
        .cloned()
        .ok_or(CommandError::NotBulkString(command))
}

fn parse_ping(args: &[RespValue]) -> Result<Command, CommandError> {
    match args {
        [] => Ok(Command::Ping(None)),
        [message] => Ok(Command::Ping(Some(bulk_arg(message, "ping")?))),
        _ => Err(CommandError::WrongArity("ping")),
    }
}

fn parse_echo(args: &[RespValue]) -> Result<Command, CommandError> {
    match args {
        [message] => Ok(Command::Echo(bulk_arg(message, "echo")?)),
        _ => Err(CommandError::WrongArity("echo")),
    }
}

fn parse_get(args: &[RespValue]) -> Result<Command, CommandError> {
    match args {
        [key] => Ok(Command::Get(bulk_arg(key, "get")?)),
        _ => Err(CommandError::WrongArity("get")),
    }
}

fn parse_set(args: &[RespValue]) -> Result<Command, CommandError> {
    let (key, value, option) = match args {
        [key, value] => (key, value, None),
        [key, value, name, amount] => (key, value, Some((name, amount))),
        _ => return Err(CommandError::WrongArity("set")),
    };

    let key = bulk_arg(key, "set")?;
    let value = bulk_arg(value, "set")?;

    let ttl = match option {
        None => None,
        Some((name, amount)) => {
            if !bulk_arg(name, "set")?.eq_ignore_ascii_case(b"PX") {
                return Err(CommandError::Syntax);
            }
            Some(parse_millis(&bulk_arg(amount, "set")?)?)
        }
    };

    Ok(Command::Set { key, value, ttl })
}

fn parse_millis(raw: &[u8]) -> Result<Duration, CommandError> {
    let ms: i64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)?;

    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| CommandError::InvalidExpireTime)
}
