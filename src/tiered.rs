//! Two-tier (L1/L2) cache orchestration.
//!
//! L1 is an in-memory [`Cache`]; L2 is any [`Store`]. Writes land in L1
//! and, under `write_through` (the default), mirror into L2. Reads try L1
//! first; an L2 hit is lifted back into L1 under `promote_on_access` (the
//! default), preserving the entry's remaining TTL so promotion never
//! extends a lifetime.
//!
//! L2 I/O failures degrade reads to misses without touching L1; on a
//! write-through they surface to the caller after the L1 write has already
//! happened.

use std::time::Duration;

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::cache::Cache;
use crate::entry::Entry;
use crate::error::CacheResult;
use crate::store::Store;

/// Layering options for a [`TieredCache`].
#[derive(Debug, Clone, Copy)]
pub struct TieredCacheConfig {
    /// Mirror every write into L2.
    pub write_through: bool,
    /// Lift L2 hits into L1.
    pub promote_on_access: bool,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        TieredCacheConfig {
            write_through: true,
            promote_on_access: true,
        }
    }
}

/// An L1 [`Cache`] in front of an L2 [`Store`].
pub struct TieredCache<V, S> {
    l1: Cache<V>,
    l2: S,
    config: TieredCacheConfig,
}

impl<V, S> TieredCache<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: Store<V>,
{
    /// Layers `l1` over `l2` with the default options.
    pub fn new(l1: Cache<V>, l2: S) -> Self {
        TieredCache::with_config(l1, l2, TieredCacheConfig::default())
    }

    /// Layers `l1` over `l2` with explicit options.
    pub fn with_config(l1: Cache<V>, l2: S, config: TieredCacheConfig) -> Self {
        TieredCache { l1, l2, config }
    }

    /// The in-memory layer.
    pub fn l1(&self) -> &Cache<V> {
        &self.l1
    }

    /// The persistent layer.
    pub fn l2(&self) -> &S {
        &self.l2
    }

    fn insert_preserving_ttl(&self, key: &str, entry: &Entry<V>) {
        match entry.ttl_remaining() {
            Some(remaining) => self.l1.set_with_ttl(key, entry.value().clone(), remaining),
            None => self.l1.set_permanent(key, entry.value().clone()),
        }
    }

    /// Looks up `key` in L1, then L2.
    ///
    /// An expired L2 entry is deleted from L2 and reads as a miss. An L2
    /// I/O failure also reads as a miss.
    pub async fn get(&self, key: &str) -> CacheResult<Option<V>> {
        if let Some(value) = self.l1.get(key) {
            return Ok(Some(value));
        }
        let entry = match self.l2.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, %err, "L2 read failed; treating as miss");
                return Ok(None);
            }
        };
        let Some(entry) = entry else {
            return Ok(None);
        };
        if entry.is_expired() {
            if let Err(err) = self.l2.remove(key).await {
                warn!(key, %err, "failed to delete expired L2 entry");
            }
            return Ok(None);
        }
        if self.config.promote_on_access {
            self.insert_preserving_ttl(key, &entry);
        }
        Ok(Some(entry.into_value()))
    }

    /// Writes to L1 (default TTL) and, under write-through, to L2.
    pub async fn set(&self, key: &str, value: V) -> CacheResult<()> {
        self.l1.set(key, value);
        self.write_through(key).await
    }

    /// Writes with an explicit TTL.
    pub async fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) -> CacheResult<()> {
        self.l1.set_with_ttl(key, value, ttl);
        self.write_through(key).await
    }

    /// Writes without expiration.
    pub async fn set_permanent(&self, key: &str, value: V) -> CacheResult<()> {
        self.l1.set_permanent(key, value);
        self.write_through(key).await
    }

    async fn write_through(&self, key: &str) -> CacheResult<()> {
        if !self.config.write_through {
            return Ok(());
        }
        // The entry may already be gone if L1 capacity evicted it; nothing
        // to mirror then.
        if let Some(entry) = self.l1.get_entry(key) {
            self.l2.put(key, entry).await?;
        }
        Ok(())
    }

    /// Removes `key` from both layers, returning the L1 value if any.
    pub async fn remove(&self, key: &str) -> CacheResult<Option<V>> {
        let value = self.l1.remove(key);
        self.l2.remove(key).await?;
        Ok(value)
    }

    /// Clears both layers.
    pub async fn clear(&self) -> CacheResult<()> {
        self.l1.clear();
        self.l2.clear().await
    }

    /// Union of L1 and L2 keys.
    pub async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut seen: FxHashSet<String> = self.l1.keys().into_iter().collect();
        for key in self.l2.keys().await? {
            seen.insert(key);
        }
        Ok(seen.into_iter().collect())
    }

    /// Writes every L1 entry to L2, then clears L1. Returns how many
    /// entries were flushed.
    pub async fn flush_l1_to_l2(&self) -> CacheResult<u64> {
        let mut flushed = 0;
        for key in self.l1.keys() {
            if let Some(entry) = self.l1.get_entry(&key) {
                self.l2.put(&key, entry).await?;
                flushed += 1;
            }
        }
        self.l1.clear();
        Ok(flushed)
    }

    /// Populates L1 from L2 for the given keys, preserving remaining TTLs.
    /// Returns how many entries were promoted.
    pub async fn warm_up_l1(&self, keys: &[&str]) -> CacheResult<u64> {
        let mut promoted = 0;
        for key in keys {
            if let Some(entry) = self.l2.get(key).await? {
                if entry.is_valid() {
                    self.insert_preserving_ttl(key, &entry);
                    promoted += 1;
                }
            }
        }
        Ok(promoted)
    }

    /// Closes the persistent layer.
    pub async fn close(&self) -> CacheResult<()> {
        self.l2.close().await
    }
}
