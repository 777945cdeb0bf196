//! Namespace-prefixed views over a cache.
//!
//! A namespace is the prefix `"<name>::"` applied to every key a view
//! touches. Views are plain key transformers: the underlying cache keeps
//! one flat keyspace, so a literal key `"users::1"` and the key `"1"` seen
//! through the `users` view are the same mapping. Nested namespaces
//! compose prefixes (`users::profiles::`).

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::cache::{Cache, PATH_SEPARATOR};

/// Hands out (and memoizes) per-namespace views of one cache.
pub struct NamespacedCache<V> {
    cache: Cache<V>,
    views: Mutex<FxHashMap<String, NamespaceView<V>>>,
}

impl<V> NamespacedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wraps `cache` with namespace bookkeeping.
    pub fn new(cache: Cache<V>) -> Self {
        NamespacedCache {
            cache,
            views: Mutex::new(FxHashMap::default()),
        }
    }

    /// The view for `name`, created on first use.
    pub fn namespace(&self, name: &str) -> NamespaceView<V> {
        let mut views = self.views.lock();
        views
            .entry(name.to_string())
            .or_insert_with(|| NamespaceView::new(self.cache.clone(), name))
            .clone()
    }

    /// The underlying cache with its flat keyspace.
    pub fn inner(&self) -> &Cache<V> {
        &self.cache
    }
}

/// Operations on one namespace; every key is prefixed before delegation.
pub struct NamespaceView<V> {
    cache: Cache<V>,
    prefix: String,
}

impl<V> Clone for NamespaceView<V> {
    fn clone(&self) -> Self {
        NamespaceView {
            cache: self.cache.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl<V> NamespaceView<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(cache: Cache<V>, name: &str) -> Self {
        NamespaceView {
            cache,
            prefix: format!("{name}{PATH_SEPARATOR}"),
        }
    }

    /// The full prefix this view applies, separator included.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// A child view whose prefix nests under this one.
    pub fn namespace(&self, name: &str) -> NamespaceView<V> {
        NamespaceView {
            cache: self.cache.clone(),
            prefix: format!("{}{name}{PATH_SEPARATOR}", self.prefix),
        }
    }

    /// Looks up `key` within the namespace.
    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(&self.qualify(key))
    }

    /// Inserts with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.cache.set(&self.qualify(key), value);
    }

    /// Inserts with an explicit TTL.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.cache.set_with_ttl(&self.qualify(key), value, ttl);
    }

    /// Inserts without expiration.
    pub fn set_permanent(&self, key: &str, value: V) {
        self.cache.set_permanent(&self.qualify(key), value);
    }

    /// Checks for a valid mapping.
    pub fn contains_key(&self, key: &str) -> bool {
        self.cache.contains_key(&self.qualify(key))
    }

    /// Removes a mapping, returning its value.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.cache.remove(&self.qualify(key))
    }

    /// Live keys in this namespace, prefix stripped.
    pub fn keys(&self) -> Vec<String> {
        self.cache
            .keys_with_prefix(&self.prefix)
            .into_iter()
            .map(|key| key[self.prefix.len()..].to_string())
            .collect()
    }

    /// Number of live entries in this namespace.
    pub fn len(&self) -> usize {
        self.cache.keys_with_prefix(&self.prefix).len()
    }

    /// `true` when the namespace holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key in this namespace (nested namespaces included),
    /// returning the count. Keys outside the prefix are untouched.
    pub fn clear(&self) -> u64 {
        self.cache.remove_with_prefix(&self.prefix)
    }
}
