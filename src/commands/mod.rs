//! Command execution.
//!
//! [`CommandHandler`] turns a decoded [`Command`](crate::protocol::Command)
//! into a storage call and a [`Response`](crate::protocol::Response). Pool
//! workers call it; it never touches a socket.

pub mod handler;

pub use handler::CommandHandler;
