//! Fluent cache assembly.
//!
//! [`CacheBuilder`] accumulates configuration and produces a plain
//! [`Cache`], a loader-backed [`LoadingCache`], or a synchronous
//! [`SyncLoadingCache`].
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use stashkit::builder::CacheBuilder;
//! use stashkit::config::EvictionPolicyKind;
//!
//! let cache: stashkit::cache::Cache<String> = CacheBuilder::new()
//!     .max_entries(10_000)
//!     .expire_after_write(Duration::from_secs(300))
//!     .eviction_policy(EvictionPolicyKind::Lru)
//!     .record_stats()
//!     .build();
//! cache.set("greeting", "hello".to_string());
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::{CacheConfig, EvictionPolicyKind, EvictedCallback, RemovalCause, RemovalListener};
use crate::loading::{LoaderFuture, LoadingCache};

/// Accumulates configuration for a [`Cache`] and its wrappers.
pub struct CacheBuilder<V> {
    max_entries: Option<u64>,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    eviction_policy: EvictionPolicyKind,
    record_stats: bool,
    enable_event_stream: bool,
    auto_trim: bool,
    auto_trim_interval: Duration,
    stale_while_revalidate: bool,
    stale_time: Option<Duration>,
    on_evicted: Option<EvictedCallback<V>>,
    removal_listener: Option<RemovalListener<V>>,
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        let defaults: CacheConfig<V> = CacheConfig::default();
        CacheBuilder {
            max_entries: None,
            expire_after_write: None,
            expire_after_access: None,
            eviction_policy: defaults.eviction_policy,
            record_stats: false,
            enable_event_stream: false,
            auto_trim: false,
            auto_trim_interval: defaults.auto_trim_interval,
            stale_while_revalidate: false,
            stale_time: None,
            on_evicted: None,
            removal_listener: None,
        }
    }
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Starts an empty builder.
    pub fn new() -> Self {
        CacheBuilder::default()
    }

    /// Caps the cache at `max` mappings.
    pub fn max_entries(mut self, max: u64) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Expires entries `ttl` after they are written.
    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.expire_after_write = Some(ttl);
        self
    }

    /// Recorded for API parity; folded into the write TTL as a fallback
    /// when no write expiry is configured (expiry is always measured from
    /// the write).
    pub fn expire_after_access(mut self, ttl: Duration) -> Self {
        self.expire_after_access = Some(ttl);
        self
    }

    /// Selects the eviction discipline.
    pub fn eviction_policy(mut self, policy: EvictionPolicyKind) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Installs a metrics collector.
    pub fn record_stats(mut self) -> Self {
        self.record_stats = true;
        self
    }

    /// Installs an event bus.
    pub fn event_stream(mut self) -> Self {
        self.enable_event_stream = true;
        self
    }

    /// Runs the expiration sweep every `interval`.
    pub fn auto_trim(mut self, interval: Duration) -> Self {
        self.auto_trim = true;
        self.auto_trim_interval = interval;
        self
    }

    /// Enables background revalidation for `get_stale`, serving entries
    /// older than `stale_time` while refreshing them.
    pub fn stale_while_revalidate(mut self, stale_time: Duration) -> Self {
        self.stale_while_revalidate = true;
        self.stale_time = Some(stale_time);
        self
    }

    /// Invokes `callback` whenever an entry is destroyed.
    pub fn on_evicted(mut self, callback: impl Fn(&str, &V) + Send + Sync + 'static) -> Self {
        self.on_evicted = Some(Arc::new(callback));
        self
    }

    /// Invokes `listener` on every removal with its [`RemovalCause`],
    /// replacement included.
    pub fn removal_listener(
        mut self,
        listener: impl Fn(&str, &V, RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        self.removal_listener = Some(Arc::new(listener));
        self
    }

    fn into_config(self) -> CacheConfig<V> {
        let defaults: CacheConfig<V> = CacheConfig::default();
        CacheConfig {
            default_ttl: self
                .expire_after_write
                .or(self.expire_after_access)
                .or(defaults.default_ttl),
            max_entries: self.max_entries,
            auto_trim: self.auto_trim,
            auto_trim_interval: self.auto_trim_interval,
            eviction_policy: self.eviction_policy,
            record_stats: self.record_stats,
            enable_event_stream: self.enable_event_stream,
            stale_while_revalidate: self.stale_while_revalidate,
            stale_time: self.stale_time,
            on_evicted: self.on_evicted,
            removal_listener: self.removal_listener,
        }
    }

    /// Produces the configured [`Cache`].
    pub fn build(self) -> Cache<V> {
        Cache::with_config(self.into_config())
    }

    /// Produces a [`LoadingCache`] around the configured cache.
    pub fn build_async(
        self,
        loader: impl Fn(String) -> LoaderFuture<V> + Send + Sync + 'static,
    ) -> LoadingCache<V> {
        LoadingCache::new(Cache::with_config(self.into_config()), loader)
    }

    /// Produces a [`SyncLoadingCache`] around the configured cache.
    pub fn build_sync(
        self,
        loader: impl Fn(&str) -> V + Send + Sync + 'static,
    ) -> SyncLoadingCache<V> {
        SyncLoadingCache {
            cache: Cache::with_config(self.into_config()),
            loader: Arc::new(loader),
        }
    }
}

/// A cache backed by a synchronous loader, invoked on first access per
/// key.
///
/// Unlike [`LoadingCache`] there is no in-flight table; concurrent callers
/// of the same missing key may each invoke the loader.
pub struct SyncLoadingCache<V> {
    cache: Cache<V>,
    loader: Arc<dyn Fn(&str) -> V + Send + Sync>,
}

impl<V> Clone for SyncLoadingCache<V> {
    fn clone(&self) -> Self {
        SyncLoadingCache {
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<V> SyncLoadingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Looks up `key`, invoking the loader and caching on a miss.
    pub fn get(&self, key: &str) -> V {
        self.cache.get_or_set(key, || (self.loader)(key))
    }

    /// Removes a mapping, forcing the next `get` to reload.
    pub fn invalidate(&self, key: &str) -> Option<V> {
        self.cache.remove(key)
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Cache<V> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn builder_folds_access_expiry_into_write_ttl() {
        let cache: Cache<u32> = CacheBuilder::new()
            .expire_after_access(Duration::from_secs(120))
            .build();
        assert_eq!(cache.config().default_ttl, Some(Duration::from_secs(120)));

        let cache: Cache<u32> = CacheBuilder::new()
            .expire_after_write(Duration::from_secs(60))
            .expire_after_access(Duration::from_secs(120))
            .build();
        assert_eq!(cache.config().default_ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn builder_wires_policy_and_capacity() {
        let cache: Cache<u32> = CacheBuilder::new()
            .max_entries(2)
            .eviction_policy(EvictionPolicyKind::Fifo)
            .build();

        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn builder_installs_removal_listener() {
        let causes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&causes);
        let cache: Cache<u32> = CacheBuilder::new()
            .removal_listener(move |_, _, cause| {
                assert_eq!(cause, RemovalCause::Explicit);
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        cache.set("a", 1);
        cache.remove("a");
        assert_eq!(causes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sync_loading_cache_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = CacheBuilder::new().build_sync(move |key: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("{key}!")
        });

        assert_eq!(cache.get("x"), "x!");
        assert_eq!(cache.get("x"), "x!");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("x");
        assert_eq!(cache.get("x"), "x!");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn build_async_produces_a_loading_cache() {
        let cache = CacheBuilder::new().build_async(|key: String| {
            Box::pin(async move { Ok(format!("{key}!")) }) as LoaderFuture<String>
        });
        assert_eq!(cache.get("x").await.unwrap(), "x!");
    }
}
