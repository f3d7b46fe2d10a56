//! Incremental Command Frame Parser
//!
//! TCP gives us a byte stream, not messages, so frames may arrive split
//! across reads or several at once. The parser works on whatever is buffered
//! and returns either:
//!
//! - `Ok(Some((command, consumed)))` - a complete frame, `consumed` bytes used
//! - `Ok(None)` - the frame is incomplete, read more and retry
//! - `Err(ProtocolError)` - the frame is invalid, or the stream ended inside it
//!
//! The caller passes `at_eof` once the peer has closed its side. That is the
//! only way to tell an absent trailing TTL from one that has not arrived yet.
//!
//! The parser never consumes the authentication token; that is handled by
//! [`Authenticator`](crate::protocol::Authenticator) before a frame is parsed.

use crate::protocol::types::{tag, Command, Response, LEN_FIELD, TAG_LEN};
use bytes::{Buf, Bytes};
use std::fmt;
use thiserror::Error;

/// Default exclusive upper bound on key length.
pub const MAX_KEY_SIZE: usize = 256;

/// Default exclusive upper bound on value length (10 KB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024;

/// A field of a command frame, used to report where a frame was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Command,
    KeyLength,
    Key,
    ValueLength,
    Value,
    Ttl,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Command => "command",
            Field::KeyLength => "key length",
            Field::Key => "key",
            Field::ValueLength => "value length",
            Field::Value => "value",
            Field::Ttl => "TTL",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while decoding a frame.
///
/// The `Display` text is the message sent to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ERR 1001 Invalid key length")]
    InvalidKeyLength(u32),

    #[error("ERR 1001 Invalid value length")]
    InvalidValueLength(u32),

    /// The stream ended in the middle of a field.
    #[error("ERR 1003 failed to read {field}")]
    Truncated { field: Field },
}

impl ProtocolError {
    /// A truncated frame can never be completed; the connection is done.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Truncated { .. })
    }
}

impl From<&ProtocolError> for Response {
    fn from(err: &ProtocolError) -> Self {
        Response::error(err.to_string())
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Size bounds applied to keys and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Keys must be shorter than this.
    pub max_key_size: usize,
    /// Values must be shorter than this.
    pub max_value_size: usize,
}

impl FrameLimits {
    /// Largest frame, token excluded, that these limits admit.
    pub fn max_frame_len(&self) -> usize {
        TAG_LEN + 3 * LEN_FIELD + self.max_key_size + self.max_value_size
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_key_size: MAX_KEY_SIZE,
            max_value_size: MAX_VALUE_SIZE,
        }
    }
}

/// Parser for command frames.
///
/// # Example
///
/// ```
/// use shardkv::protocol::{Command, FrameParser};
/// use bytes::Bytes;
///
/// let parser = FrameParser::default();
/// let (cmd, consumed) = parser
///     .parse(b"DEL\x00\x00\x00\x03foo", false)
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(cmd, Command::Del { key: Bytes::from("foo") });
/// assert_eq!(consumed, 10);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameParser {
    limits: FrameLimits,
}

impl FrameParser {
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Attempts to parse one command frame from the start of `buf`.
    pub fn parse(&self, buf: &[u8], at_eof: bool) -> ParseResult<Option<(Command, usize)>> {
        let mut cursor = Cursor {
            buf,
            pos: 0,
            at_eof,
        };

        let tag_bytes = match cursor.take(TAG_LEN, Field::Command)? {
            Some(t) => t,
            None => return Ok(None),
        };

        let command = match tag_bytes {
            t if t == tag::GET => match self.parse_key(&mut cursor)? {
                Some(key) => Command::Get { key },
                None => return Ok(None),
            },
            t if t == tag::DEL => match self.parse_key(&mut cursor)? {
                Some(key) => Command::Del { key },
                None => return Ok(None),
            },
            t if t == tag::SET => match self.parse_set(&mut cursor)? {
                Some(cmd) => cmd,
                None => return Ok(None),
            },
            t if t == tag::REMOVE_ALL => Command::RemoveAll,
            other => {
                // Nothing after an unknown tag can be framed; drop what is buffered
                return Ok(Some((Command::Unknown(Bytes::copy_from_slice(other)), buf.len())));
            }
        };

        Ok(Some((command, cursor.pos)))
    }

    fn parse_key(&self, cursor: &mut Cursor<'_>) -> ParseResult<Option<Bytes>> {
        let len = match cursor.take_u32(Field::KeyLength)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len == 0 || len as usize >= self.limits.max_key_size {
            return Err(ProtocolError::InvalidKeyLength(len));
        }
        Ok(cursor
            .take(len as usize, Field::Key)?
            .map(Bytes::copy_from_slice))
    }

    fn parse_value(&self, cursor: &mut Cursor<'_>) -> ParseResult<Option<Bytes>> {
        let len = match cursor.take_u32(Field::ValueLength)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len == 0 || len as usize >= self.limits.max_value_size {
            return Err(ProtocolError::InvalidValueLength(len));
        }
        Ok(cursor
            .take(len as usize, Field::Value)?
            .map(Bytes::copy_from_slice))
    }

    fn parse_set(&self, cursor: &mut Cursor<'_>) -> ParseResult<Option<Command>> {
        let key = match self.parse_key(cursor)? {
            Some(key) => key,
            None => return Ok(None),
        };
        let value = match self.parse_value(cursor)? {
            Some(value) => value,
            None => return Ok(None),
        };

        // Optional TTL: only a clean end of stream right after the value
        // means "no TTL"
        let ttl_secs = if cursor.remaining() == 0 && cursor.at_eof {
            0
        } else {
            match cursor.take_u32(Field::Ttl)? {
                Some(ttl) => ttl,
                None => return Ok(None),
            }
        };

        Ok(Some(Command::Set {
            key,
            value,
            ttl_secs,
        }))
    }
}

impl FrameParser {
    /// Measures the frame at the start of `buf` without enforcing size bounds.
    ///
    /// After [`parse`](Self::parse) rejects a frame for a bad length, this
    /// tells the caller how many bytes to drop to reach the next frame.
    /// A declared length above `max_skip` is returned as the length error.
    pub fn frame_len(
        &self,
        buf: &[u8],
        at_eof: bool,
        max_skip: usize,
    ) -> ParseResult<Option<usize>> {
        let mut cursor = Cursor {
            buf,
            pos: 0,
            at_eof,
        };

        let tag_bytes = match cursor.take(TAG_LEN, Field::Command)? {
            Some(t) => t,
            None => return Ok(None),
        };

        let is_set = tag_bytes == tag::SET;
        let fields: &[(Field, Field)] = match tag_bytes {
            t if t == tag::GET || t == tag::DEL => &[(Field::KeyLength, Field::Key)],
            _ if is_set => &[(Field::KeyLength, Field::Key), (Field::ValueLength, Field::Value)],
            t if t == tag::REMOVE_ALL => return Ok(Some(TAG_LEN)),
            _ => return Ok(Some(buf.len())),
        };

        for &(len_field, data_field) in fields {
            let len = match cursor.take_u32(len_field)? {
                Some(len) => len,
                None => return Ok(None),
            };
            if len as usize > max_skip {
                return Err(match data_field {
                    Field::Key => ProtocolError::InvalidKeyLength(len),
                    _ => ProtocolError::InvalidValueLength(len),
                });
            }
            if cursor.take(len as usize, data_field)?.is_none() {
                return Ok(None);
            }
        }

        if is_set
            && !(cursor.remaining() == 0 && cursor.at_eof)
            && cursor.take_u32(Field::Ttl)?.is_none()
        {
            return Ok(None);
        }

        Ok(Some(cursor.pos))
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    at_eof: bool,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, field: Field) -> ParseResult<Option<&'a [u8]>> {
        if self.remaining() < n {
            if self.at_eof {
                return Err(ProtocolError::Truncated { field });
            }
            return Ok(None);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(Some(bytes))
    }

    fn take_u32(&mut self, field: Field) -> ParseResult<Option<u32>> {
        Ok(self.take(LEN_FIELD, field)?.map(|mut b| b.get_u32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FrameParser {
        FrameParser::default()
    }

    fn set(key: &str, value: &str, ttl_secs: u32) -> Command {
        Command::Set {
            key: Bytes::from(key.to_string()),
            value: Bytes::from(value.to_string()),
            ttl_secs,
        }
    }

    fn frame(cmd: &Command) -> Vec<u8> {
        cmd.encode(b"").to_vec()
    }

    #[test]
    fn test_parse_get() {
        let input = b"GET\x00\x00\x00\x04name";
        let (cmd, consumed) = parser().parse(input, false).unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Get {
                key: Bytes::from("name")
            }
        );
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_set_with_ttl() {
        let input = frame(&set("foo", "bar", 5));
        let (cmd, consumed) = parser().parse(&input, false).unwrap().unwrap();
        assert_eq!(cmd, set("foo", "bar", 5));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_set_without_ttl_at_eof() {
        let input = b"SET\x00\x00\x00\x03foo\x00\x00\x00\x03bar";

        // Stream still open: the TTL may be on its way
        assert!(parser().parse(input, false).unwrap().is_none());

        // Stream closed right after the value: no TTL
        let (cmd, consumed) = parser().parse(input, true).unwrap().unwrap();
        assert_eq!(cmd, set("foo", "bar", 0));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_set_partial_ttl_at_eof() {
        let input = b"SET\x00\x00\x00\x03foo\x00\x00\x00\x03bar\x00\x00";
        assert_eq!(
            parser().parse(input, true),
            Err(ProtocolError::Truncated { field: Field::Ttl })
        );
    }

    #[test]
    fn test_parse_remove_all() {
        let (cmd, consumed) = parser().parse(b"RAL", false).unwrap().unwrap();
        assert_eq!(cmd, Command::RemoveAll);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_parse_leaves_following_bytes() {
        let mut input = frame(&Command::Del {
            key: Bytes::from("k"),
        });
        let first_len = input.len();
        input.extend_from_slice(b"tokenGET");

        let (_, consumed) = parser().parse(&input, false).unwrap().unwrap();
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_parse_incremental() {
        let input = frame(&set("user:101", "penguin", 60));

        // Every strict prefix is incomplete, never an error
        for end in 0..input.len() {
            assert!(
                parser().parse(&input[..end], false).unwrap().is_none(),
                "prefix of {} bytes parsed early",
                end
            );
        }
        assert!(parser().parse(&input, false).unwrap().is_some());
    }

    #[test]
    fn test_truncated_fields_at_eof() {
        let cases: [(&[u8], Field); 5] = [
            (b"GE", Field::Command),
            (b"GET\x00\x00", Field::KeyLength),
            (b"GET\x00\x00\x00\x04na", Field::Key),
            (b"SET\x00\x00\x00\x01k\x00", Field::ValueLength),
            (b"SET\x00\x00\x00\x01k\x00\x00\x00\x05va", Field::Value),
        ];

        for (input, field) in cases {
            let err = parser().parse(input, true).unwrap_err();
            assert_eq!(err, ProtocolError::Truncated { field });
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_truncated_message_names_field() {
        let err = ProtocolError::Truncated {
            field: Field::KeyLength,
        };
        assert_eq!(err.to_string(), "ERR 1003 failed to read key length");
        assert_eq!(
            Response::from(&err).serialize(),
            Bytes::from_static(b"-ERR 1003 failed to read key length")
        );
    }

    #[test]
    fn test_key_length_bounds() {
        // Zero-length key
        assert_eq!(
            parser().parse(b"GET\x00\x00\x00\x00", false),
            Err(ProtocolError::InvalidKeyLength(0))
        );

        // 256 is not < 256; rejected before the key bytes arrive
        assert_eq!(
            parser().parse(b"DEL\x00\x00\x01\x00", false),
            Err(ProtocolError::InvalidKeyLength(256))
        );

        // 255 is accepted
        let key = "k".repeat(255);
        let input = frame(&Command::Get {
            key: Bytes::from(key.clone()),
        });
        let (cmd, _) = parser().parse(&input, false).unwrap().unwrap();
        assert_eq!(cmd, Command::Get { key: Bytes::from(key) });
    }

    #[test]
    fn test_value_length_bounds() {
        assert_eq!(
            parser().parse(b"SET\x00\x00\x00\x01k\x00\x00\x00\x00", false),
            Err(ProtocolError::InvalidValueLength(0))
        );
        assert_eq!(
            parser().parse(b"SET\x00\x00\x00\x01k\x00\x00\x28\x00", false),
            Err(ProtocolError::InvalidValueLength(10240))
        );
        assert!(!ProtocolError::InvalidValueLength(0).is_fatal());

        let value = "v".repeat(MAX_VALUE_SIZE - 1);
        let input = frame(&set("k", &value, 0));
        assert!(parser().parse(&input, false).unwrap().is_some());
    }

    #[test]
    fn test_frame_len_steps_over_rejected_frame() {
        let value = "v".repeat(MAX_VALUE_SIZE);
        let mut input = frame(&set("k", &value, 7));
        let bad_len = input.len();
        input.extend_from_slice(&frame(&Command::RemoveAll));

        assert_eq!(
            parser().parse(&input, false),
            Err(ProtocolError::InvalidValueLength(MAX_VALUE_SIZE as u32))
        );

        // Not all of the value is here yet
        assert_eq!(parser().frame_len(&input[..100], false, 1 << 20), Ok(None));

        assert_eq!(parser().frame_len(&input, false, 1 << 20), Ok(Some(bad_len)));
        let (cmd, _) = parser().parse(&input[bad_len..], false).unwrap().unwrap();
        assert_eq!(cmd, Command::RemoveAll);
    }

    #[test]
    fn test_frame_len_zero_key() {
        let input = b"GET\x00\x00\x00\x00DEL";
        assert_eq!(parser().frame_len(input, false, 1024), Ok(Some(7)));
    }

    #[test]
    fn test_frame_len_refuses_oversized_skip() {
        assert_eq!(
            parser().frame_len(b"SET\xff\xff\xff\xff", false, 1024),
            Err(ProtocolError::InvalidKeyLength(u32::MAX))
        );
    }

    #[test]
    fn test_max_frame_len() {
        let limits = FrameLimits::default();
        assert_eq!(limits.max_frame_len(), 3 + 12 + MAX_KEY_SIZE + MAX_VALUE_SIZE);

        // The largest legal SET fits
        let input = frame(&set(&"k".repeat(255), &"v".repeat(MAX_VALUE_SIZE - 1), 1));
        assert!(input.len() <= limits.max_frame_len());
    }

    #[test]
    fn test_custom_limits() {
        let parser = FrameParser::new(FrameLimits {
            max_key_size: 4,
            max_value_size: 4,
        });
        assert_eq!(
            parser.parse(b"GET\x00\x00\x00\x04", false),
            Err(ProtocolError::InvalidKeyLength(4))
        );
        assert!(parser
            .parse(b"GET\x00\x00\x00\x03abc", false)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_unknown_command_consumes_buffer() {
        let input = b"PUT\x00\x00\x00\x03foo";
        let (cmd, consumed) = parser().parse(input, false).unwrap().unwrap();
        assert_eq!(cmd, Command::Unknown(Bytes::from_static(b"PUT")));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let (cmd, _) = parser().parse(b"get", false).unwrap().unwrap();
        assert!(matches!(cmd, Command::Unknown(_)));
    }

    #[test]
    fn test_binary_safe_key_and_value() {
        let cmd = Command::Set {
            key: Bytes::from_static(b"k\x00\r\n"),
            value: Bytes::from_static(b"\xff\x00OK"),
            ttl_secs: 0,
        };
        let input = frame(&cmd);
        let (parsed, _) = parser().parse(&input, false).unwrap().unwrap();
        assert_eq!(parsed, cmd);
    }
}
