//! Storage Engine Module
//!
//! A thread-safe, sharded key-value store with TTL support and a background
//! expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...16    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use shardkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::with_shards(16);
//!
//! engine.set(Bytes::from("name"), Bytes::from("penguin"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("penguin")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//!
//! engine.delete(b"name");
//! engine.flush();
//! assert!(engine.is_empty());
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, Lookup, StorageEngine, StorageStats, DEFAULT_SHARDS};
pub use expiry::{ExpiryConfig, ExpirySweeper};
