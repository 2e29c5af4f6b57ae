/*!
 * Reply Value Model
 *
 * This module defines the value every server answer is decoded into.
 * A reply is a recursive tagged union mirroring the RESP2 reply grammar:
 * integers, bulk strings, arrays of replies, errors, status lines and nil.
 */

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// One decoded server reply
///
/// Arrays hold nested replies of the same grammar. A reply is built once by
/// the decoder and handed to exactly one correlation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `:<n>` integer reply
    Integer(i64),
    /// `$<len>` bulk string, binary safe
    String(Bytes),
    /// `*<n>` multi-bulk reply
    Array(Vec<Reply>),
    /// `-<message>` error reply
    Error(String),
    /// `+<message>` status reply, e.g. `OK` or `PONG`
    Status(String),
    /// `$-1` or `*-1`
    Nil,
}

/// Discriminant of a [`Reply`], used in type-mismatch errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Integer,
    String,
    Array,
    Error,
    Status,
    Nil,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Integer => "integer",
            ReplyKind::String => "string",
            ReplyKind::Array => "array",
            ReplyKind::Error => "error",
            ReplyKind::Status => "status",
            ReplyKind::Nil => "nil",
        };
        f.write_str(name)
    }
}

/// Errors raised when a reply is read as the wrong variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("reply type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ReplyKind, found: ReplyKind },
    #[error("string reply {0:?} is not a decimal integer")]
    NotAnInteger(String),
    #[error("string reply is not valid UTF-8")]
    NotUtf8,
}

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Integer(_) => ReplyKind::Integer,
            Reply::String(_) => ReplyKind::String,
            Reply::Array(_) => ReplyKind::Array,
            Reply::Error(_) => ReplyKind::Error,
            Reply::Status(_) => ReplyKind::Status,
            Reply::Nil => ReplyKind::Nil,
        }
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Reply::Integer(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Reply::String(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Reply::Array(_))
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        matches!(self, Reply::Status(_))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// True for a `+OK` status reply
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    /// Integer value of an `Integer` reply
    pub fn integer(&self) -> Result<i64, ReplyError> {
        match self {
            Reply::Integer(i) => Ok(*i),
            other => Err(other.mismatch(ReplyKind::Integer)),
        }
    }

    /// Integer value, parsing `String` replies holding a decimal number
    ///
    /// Servers answer `GET` on a counter with a bulk string, so callers
    /// reading counters back use this instead of [`Reply::integer`].
    pub fn integer_autoconv(&self) -> Result<i64, ReplyError> {
        match self {
            Reply::Integer(i) => Ok(*i),
            Reply::String(s) => parse_decimal(s),
            other => Err(other.mismatch(ReplyKind::Integer)),
        }
    }

    /// Bytes of a `String` reply; `Nil` reads as empty
    pub fn string(&self) -> Result<&[u8], ReplyError> {
        match self {
            Reply::String(s) => Ok(s),
            Reply::Nil => Ok(&[]),
            other => Err(other.mismatch(ReplyKind::String)),
        }
    }

    /// Like [`Reply::string`], validated as UTF-8
    pub fn as_str(&self) -> Result<&str, ReplyError> {
        std::str::from_utf8(self.string()?).map_err(|_| ReplyError::NotUtf8)
    }

    pub fn array(&self) -> Result<&[Reply], ReplyError> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.mismatch(ReplyKind::Array)),
        }
    }

    pub fn error_message(&self) -> Result<&str, ReplyError> {
        match self {
            Reply::Error(msg) => Ok(msg),
            other => Err(other.mismatch(ReplyKind::Error)),
        }
    }

    /// Text of a `Status` reply; `Nil` reads as an empty status
    pub fn status(&self) -> Result<&str, ReplyError> {
        match self {
            Reply::Status(msg) => Ok(msg),
            Reply::Nil => Ok(""),
            other => Err(other.mismatch(ReplyKind::Status)),
        }
    }

    /// `None` for `Nil`, the payload for `String`
    pub fn into_optional_string(self) -> Result<Option<Bytes>, ReplyError> {
        match self {
            Reply::String(s) => Ok(Some(s)),
            Reply::Nil => Ok(None),
            other => Err(other.mismatch(ReplyKind::String)),
        }
    }

    /// Number of `Error` replies in this reply, nested arrays included
    pub fn error_count(&self) -> usize {
        match self {
            Reply::Error(_) => 1,
            Reply::Array(items) => items.iter().map(Reply::error_count).sum(),
            _ => 0,
        }
    }

    fn mismatch(&self, expected: ReplyKind) -> ReplyError {
        ReplyError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

fn parse_decimal(s: &[u8]) -> Result<i64, ReplyError> {
    let text = std::str::from_utf8(s).map_err(|_| ReplyError::NotUtf8)?;
    text.parse::<i64>()
        .map_err(|_| ReplyError::NotAnInteger(text.to_string()))
}

impl TryFrom<Reply> for i64 {
    type Error = ReplyError;

    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        reply.integer()
    }
}

impl TryFrom<Reply> for Bytes {
    type Error = ReplyError;

    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        Ok(reply.into_optional_string()?.unwrap_or_default())
    }
}

impl TryFrom<Reply> for Option<Bytes> {
    type Error = ReplyError;

    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        reply.into_optional_string()
    }
}

impl TryFrom<Reply> for String {
    type Error = ReplyError;

    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        let bytes = Bytes::try_from(reply)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReplyError::NotUtf8)
    }
}

impl TryFrom<Reply> for Vec<Reply> {
    type Error = ReplyError;

    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        match reply {
            Reply::Array(items) => Ok(items),
            other => Err(other.mismatch(ReplyKind::Array)),
        }
    }
}

impl From<i64> for Reply {
    fn from(i: i64) -> Self {
        Reply::Integer(i)
    }
}

impl From<&'static str> for Reply {
    fn from(s: &'static str) -> Self {
        Reply::String(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<Reply>> for Reply {
    fn from(items: Vec<Reply>) -> Self {
        Reply::Array(items)
    }
}
