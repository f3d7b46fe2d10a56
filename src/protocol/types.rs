//! Wire Protocol Data Types
//!
//! Every request on the wire is a shared-secret token followed by one
//! command frame. All lengths are 4-byte big-endian unsigned integers.
//!
//! ## Request Format
//!
//! ```text
//! token   (api_key.len() bytes)
//! tag     3 ASCII bytes: GET | SET | DEL | RAL
//!
//! GET / DEL : klen:u32  key[klen]
//! SET       : klen:u32  key[klen]  vlen:u32  value[vlen]  [ttl_secs:u32]
//! RAL       : (nothing)
//! ```
//!
//! ## Response Format
//!
//! Responses are not framed: `OK`, the raw value bytes, or `-<message>`
//! (for example `-ERR 1004 Key not found`).

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Length of a command tag.
pub const TAG_LEN: usize = 3;

/// Length of every length/TTL field.
pub const LEN_FIELD: usize = 4;

/// Command tags.
pub mod tag {
    pub const GET: &[u8] = b"GET";
    pub const SET: &[u8] = b"SET";
    pub const DEL: &[u8] = b"DEL";
    pub const REMOVE_ALL: &[u8] = b"RAL";
}

/// A decoded command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        key: Bytes,
    },
    Set {
        key: Bytes,
        value: Bytes,
        /// Seconds until expiry; `0` means the key never expires.
        ttl_secs: u32,
    },
    Del {
        key: Bytes,
    },
    /// `RAL`: remove every key.
    RemoveAll,
    /// A tag that is not one of the known commands.
    Unknown(Bytes),
}

impl Command {
    /// Returns the 3-byte tag of this command.
    pub fn tag(&self) -> &[u8] {
        match self {
            Command::Get { .. } => tag::GET,
            Command::Set { .. } => tag::SET,
            Command::Del { .. } => tag::DEL,
            Command::RemoveAll => tag::REMOVE_ALL,
            Command::Unknown(t) => t.as_ref(),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::RemoveAll => "RAL",
            Command::Unknown(_) => "UNKNOWN",
        }
    }

    /// Appends this command's frame (without the token) to `buf`.
    ///
    /// `SET` always carries its TTL field, `0` when there is no expiry.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.tag());
        match self {
            Command::Get { key } | Command::Del { key } => {
                put_field(buf, key);
            }
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                put_field(buf, key);
                put_field(buf, value);
                buf.put_u32(*ttl_secs);
            }
            Command::RemoveAll | Command::Unknown(_) => {}
        }
    }

    /// Encodes a complete request: `token` followed by this command's frame.
    ///
    /// # Example
    ///
    /// ```
    /// use shardkv::protocol::Command;
    /// use bytes::Bytes;
    ///
    /// let request = Command::Get { key: Bytes::from("foo") }.encode(b"secret");
    /// assert_eq!(&request[..], b"secretGET\x00\x00\x00\x03foo");
    /// ```
    pub fn encode(&self, token: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(token.len() + self.encoded_len());
        buf.extend_from_slice(token);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn encoded_len(&self) -> usize {
        TAG_LEN
            + match self {
                Command::Get { key } | Command::Del { key } => LEN_FIELD + key.len(),
                Command::Set { key, value, .. } => 3 * LEN_FIELD + key.len() + value.len(),
                Command::RemoveAll | Command::Unknown(_) => 0,
            }
    }
}

fn put_field(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.extend_from_slice(data);
}

/// A response payload written back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `OK`
    Ok,
    /// Raw value bytes (successful GET)
    Value(Bytes),
    /// `-<message>`
    Error(String),
}

impl Response {
    /// Creates a new error response. `message` excludes the leading `-`.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    pub fn access_denied() -> Self {
        Response::error("ERR 1001 access denied")
    }

    pub fn not_found() -> Self {
        Response::error("ERR 1004 Key not found")
    }

    pub fn expired() -> Self {
        Response::error("ERR 1004 Key not found (expired)")
    }

    pub fn unknown_command() -> Self {
        Response::error("ERR unknown command")
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Bytes {
        match self {
            Response::Ok => Bytes::from_static(b"OK"),
            Response::Value(value) => value.clone(),
            Response::Error(message) => {
                let mut buf = BytesMut::with_capacity(1 + message.len());
                buf.put_u8(b'-');
                buf.extend_from_slice(message.as_bytes());
                buf.freeze()
            }
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Value(value) => write!(f, "<{} bytes>", value.len()),
            Response::Error(message) => write!(f, "-{}", message),
        }
    }
}
