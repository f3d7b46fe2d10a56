//! Thread-Safe Sharded Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for shardkv: a fixed set of
//! independently locked partitions, each a `HashMap` from key to [`Entry`].
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over N shards by a stable FNV-1a hash,
//!    so operations on different shards never contend.
//! 2. **Lazy Expiry**: A read that observes an expired entry removes it and
//!    reports it as gone. This alone keeps expired values invisible.
//! 3. **Active Expiry**: [`StorageEngine::cleanup_expired`] reclaims memory for
//!    keys nobody reads again. It is called by the background sweeper.
//! 4. **Single-shard operations**: no operation ever holds two shard locks.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry with TTL.
    ///
    /// A TTL too large for the platform clock never expires.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Outcome of a key lookup.
///
/// `Expired` is only a hint for the response text; callers must treat it
/// exactly like `Missing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Bytes),
    Missing,
    Expired,
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // Every mutation is a single insert/remove/clear, so a poisoned map is
    // still consistent and can be used as is.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 32-bit FNV-1a over the raw key bytes.
#[inline]
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// The main storage engine.
///
/// Wrapped in an `Arc` and shared by every connection and by the expiry
/// sweeper. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use shardkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("penguin"));
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("penguin")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys removed (lazily or by the sweeper)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("del_count", &self.del_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a storage engine with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a storage engine with `num_shards` shards (at least one).
    pub fn with_shards(num_shards: usize) -> Self {
        let shards = (0..num_shards.max(1)).map(|_| Shard::default()).collect();

        Self {
            shards,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Number of shards, fixed for the lifetime of the engine.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        (fnv1a(key) as usize) % self.shards.len()
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Any existing entry is replaced, including its expiry.
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key-value pair that expires after `ttl`.
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl))
    }

    /// Sets a key-value pair with a TTL in whole seconds; `0` means no expiry.
    pub fn set_with_ttl_secs(&self, key: Bytes, value: Bytes, ttl_secs: u32) -> bool {
        if ttl_secs == 0 {
            self.set(key, value)
        } else {
            self.set_with_ttl(key, value, Duration::from_secs(u64::from(ttl_secs)))
        }
    }

    fn insert(&self, key: Bytes, entry: Entry) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(&key).write();
        match data.insert(key, entry) {
            None => true,
            Some(old) => {
                if old.is_expired() {
                    self.expired_count.fetch_add(1, Ordering::Relaxed);
                }
                false
            }
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        match self.lookup(key) {
            Lookup::Found(value) => Some(value),
            Lookup::Missing | Lookup::Expired => None,
        }
    }

    /// Looks a key up, removing it if it is found expired ("lazy expiry").
    pub fn lookup(&self, key: &[u8]) -> Lookup {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // Fast path: shared lock for live or absent keys
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Lookup::Found(entry.value.clone()),
                Some(_) => {}
                None => return Lookup::Missing,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                Lookup::Expired
            }
            // Race: another writer replaced the key between the two locks
            Some(entry) => Lookup::Found(entry.value.clone()),
            None => Lookup::Expired,
        }
    }

    /// Deletes a key from the database.
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(key).write();
        data.remove(key).is_some()
    }

    /// Checks if a key exists (and is not expired). Does not remove anything.
    pub fn exists(&self, key: &[u8]) -> bool {
        let data = self.get_shard(key).read();
        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Clears all data from the database.
    ///
    /// Each shard is cleared under its own write lock, so the operation is
    /// atomic per shard only.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Returns the number of stored entries, including expired ones that
    /// have not been reclaimed yet.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.read().len() as u64).sum()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes expired keys from all shards.
    ///
    /// Each shard is scanned under its read lock; the expired keys it found
    /// are then removed under a short write lock. A key rewritten between the
    /// two phases is re-checked and kept.
    ///
    /// Returns the number of keys that were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let now = Instant::now();
            let expired: Vec<Bytes> = {
                let data = shard.read();
                data.iter()
                    .filter(|(_, entry)| entry.is_expired_at(now))
                    .map(|(key, _)| key.clone())
                    .collect()
            };

            if expired.is_empty() {
                continue;
            }

            let mut data = shard.write();
            for key in expired {
                if data.get(&key).is_some_and(|entry| entry.is_expired_at(now)) {
                    data.remove(&key);
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}
