//! # shardkv - A Sharded In-Memory Key-Value Cache
//!
//! shardkv is an in-memory key-value cache server reachable over raw TCP with
//! a compact binary protocol. Every request carries a shared-secret token.
//!
//! ## Features
//!
//! - **Sharded Storage**: independent `RwLock`-protected shards chosen by FNV-1a hash
//! - **TTL Support**: per-key expiry, enforced on read and reclaimed in the background
//! - **Admission Control**: bounded concurrent connections with a FIFO overflow queue
//! - **Ordered Replies**: each connection owns a small worker pool fed one command at a time
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              shardkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Admission   │───>│ Connection  │                  │
//! │  │ (Listener)  │    │ Controller  │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │ WorkerPool              │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │  Command    │───>│              StorageEngine                   │    │
//! │  │  Handler    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  └─────────────┘    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │                     │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardkv::{ExpirySweeper, Server, ServerConfig, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let storage = Arc::new(StorageEngine::with_shards(config.shards));
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry_config());
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     Server::new(&config, storage).run(listener).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Commands
//!
//! | Tag   | Payload                      | Reply |
//! |-------|------------------------------|-------|
//! | `GET` | key                          | value or `-ERR 1004 ...` |
//! | `SET` | key, value, optional TTL     | `OK` |
//! | `DEL` | key                          | `OK` |
//! | `RAL` | none                         | `OK` |
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame parser, command/response types and token check
//! - [`storage`]: sharded storage engine with TTL support
//! - [`commands`]: maps commands onto the storage engine
//! - [`connection`]: admission control, worker pools and client sessions
//! - [`server`]: accept loop and queued-connection promotion
//! - [`config`]: environment-based configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{ConfigError, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Authenticator, Command, FrameParser, ProtocolError, Response};
pub use server::Server;
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// Version of shardkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
