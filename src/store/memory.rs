//! Heap-backed store.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::Store;
use crate::entry::Entry;
use crate::error::CacheResult;

/// A plain in-process mapping; operations never fail.
///
/// Useful as an L2 in tests and as the reference behavior for other
/// backends.
#[derive(Debug, Default)]
pub struct MemoryStore<V> {
    entries: RwLock<FxHashMap<String, Entry<V>>>,
}

impl<V> MemoryStore<V> {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore {
            entries: RwLock::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn put(&self, key: &str, entry: Entry<V>) -> CacheResult<()> {
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Entry<V>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    async fn contains_key(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn len(&self) -> CacheResult<u64> {
        Ok(self.entries.read().len() as u64)
    }

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}
