//! Persistence backends for the second cache tier.
//!
//! A [`Store`] owns durable (or at least out-of-band) copies of entries,
//! keyed by the same flat string keys as the in-memory cache. Stores know
//! nothing about eviction or events; the [`TieredCache`] drives them.
//!
//! Two backends ship in-tree:
//!
//! | Backend | Medium | Failure modes |
//! |---------|--------|---------------|
//! | [`MemoryStore`] | process heap | none |
//! | [`FileStore`] | one JSON file per entry | I/O, corrupt files (self-healing) |
//!
//! [`TieredCache`]: crate::tiered::TieredCache

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::CacheResult;

/// Abstract, asynchronous persistence interface.
///
/// All operations are fallible; in-memory implementations simply never
/// fail. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Store<V>: Send + Sync {
    /// Persists an entry under `key`, replacing any prior entry.
    async fn put(&self, key: &str, entry: Entry<V>) -> CacheResult<()>;

    /// Loads the entry for `key`, expired or not.
    async fn get(&self, key: &str) -> CacheResult<Option<Entry<V>>>;

    /// Deletes the entry for `key`. Absence is not an error.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Lists every stored key.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// `true` when `key` has a stored entry.
    async fn contains_key(&self, key: &str) -> CacheResult<bool>;

    /// Deletes every stored entry.
    async fn clear(&self) -> CacheResult<()>;

    /// Number of stored entries.
    async fn len(&self) -> CacheResult<u64>;

    /// Releases any resources held by the store. Subsequent operations are
    /// implementation-defined.
    async fn close(&self) -> CacheResult<()>;
}
