//! Wire Protocol Implementation
//!
//! A compact binary request/response protocol over a raw TCP stream.
//!
//! ## Modules
//!
//! - `types`: [`Command`] and [`Response`], plus the request encoder
//! - `parser`: incremental frame parser with size limits
//! - `auth`: constant-time token check that precedes every frame
//!
//! ## Example
//!
//! ```
//! use shardkv::protocol::{Authenticator, Command, FrameParser, Response};
//! use bytes::Bytes;
//!
//! let auth = Authenticator::new("secret");
//! let request = Command::Set {
//!     key: Bytes::from("name"),
//!     value: Bytes::from("penguin"),
//!     ttl_secs: 0,
//! }
//! .encode(b"secret");
//!
//! let (token, frame) = request.split_at(auth.token_len());
//! auth.verify(token).unwrap();
//!
//! let (command, _consumed) = FrameParser::default().parse(frame, false).unwrap().unwrap();
//! assert!(matches!(command, Command::Set { .. }));
//!
//! assert_eq!(&Response::Ok.serialize()[..], b"OK");
//! ```

pub mod auth;
pub mod parser;
pub mod types;

pub use auth::{AuthError, Authenticator};
pub use parser::{
    Field, FrameLimits, FrameParser, ParseResult, ProtocolError, MAX_KEY_SIZE, MAX_VALUE_SIZE,
};
pub use types::{Command, Response};
