//! Connection Module
//!
//! Everything between an accepted socket and the command handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │  AdmissionController   │──> queued / rejected
//!           └────────────┬───────────┘
//!                        │
//!                        │ serve: spawn task (holds a SlotGuard)
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Auth, parse │───>│ WorkerPool  │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use shardkv::connection::{handle_connection, ConnectionContext, ConnectionStats, PoolConfig};
//! use shardkv::commands::CommandHandler;
//! use shardkv::protocol::{Authenticator, FrameParser};
//! use shardkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let ctx = ConnectionContext {
//!     command_handler: CommandHandler::new(Arc::new(StorageEngine::new())),
//!     authenticator: Arc::new(Authenticator::new("secret")),
//!     parser: FrameParser::default(),
//!     pool: PoolConfig::default(),
//!     stats: Arc::new(ConnectionStats::new()),
//! };
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, ctx.clone()));
//! ```

pub mod admission;
pub mod handler;
pub mod pool;

pub use admission::{Admission, AdmissionConfig, AdmissionController, SlotGuard};
pub use handler::{
    handle_connection, ConnectionContext, ConnectionError, ConnectionHandler, ConnectionStats,
};
pub use pool::{PoolClosed, PoolConfig, WorkerPool};
