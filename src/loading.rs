//! Loader-backed cache with single-flight miss deduplication.
//!
//! A [`LoadingCache`] wraps a [`Cache`] and an asynchronous loader. A miss
//! runs the loader at most once per key no matter how many callers race:
//! the first caller leads the load, everyone else awaits the leader's
//! result through the in-flight table. Loader failures propagate to every
//! waiter, cache nothing, and free the slot so the next caller retries
//! immediately. A cancelled leader likewise frees the slot; waiters wake
//! and re-race.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};

use crate::cache::Cache;
use crate::error::CacheResult;
use crate::flight::{Flight, FlightGroup};

/// Boxed future produced by a [`Loader`].
pub type LoaderFuture<V> = BoxFuture<'static, CacheResult<V>>;

/// Asynchronous key loader.
pub type Loader<V> = Arc<dyn Fn(String) -> LoaderFuture<V> + Send + Sync>;

/// A [`Cache`] that fills its own misses through a loader.
pub struct LoadingCache<V> {
    cache: Cache<V>,
    loader: Loader<V>,
    flights: FlightGroup<V>,
}

impl<V> Clone for LoadingCache<V> {
    fn clone(&self) -> Self {
        LoadingCache {
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
            flights: self.flights.clone(),
        }
    }
}

impl<V> LoadingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wraps `cache` with `loader`.
    pub fn new(
        cache: Cache<V>,
        loader: impl Fn(String) -> LoaderFuture<V> + Send + Sync + 'static,
    ) -> Self {
        LoadingCache {
            cache,
            loader: Arc::new(loader),
            flights: FlightGroup::new(),
        }
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Cache<V> {
        &self.cache
    }

    /// Looks up `key`, running the loader on a miss.
    ///
    /// Under `K` concurrent callers the loader runs at most once per key
    /// for the lifetime of a single miss episode; all callers receive the
    /// same result.
    pub async fn get(&self, key: &str) -> CacheResult<V> {
        loop {
            if let Some(value) = self.cache.get(key) {
                return Ok(value);
            }
            match self.flights.join(key) {
                Flight::Leader(guard) => {
                    // A racing leader may have filled the key between the
                    // miss and the join.
                    if let Some(value) = self.cache.get(key) {
                        guard.complete(Ok(value.clone()));
                        return Ok(value);
                    }
                    return match (self.loader)(key.to_string()).await {
                        Ok(value) => {
                            self.cache.set(key, value.clone());
                            guard.complete(Ok(value.clone()));
                            Ok(value)
                        }
                        Err(err) => {
                            guard.complete(Err(err.clone()));
                            Err(err)
                        }
                    };
                }
                Flight::Follower(waiter) => match waiter.wait().await {
                    Some(result) => return result,
                    // Leader cancelled; re-race the load.
                    None => continue,
                },
            }
        }
    }

    /// Fans [`get`](Self::get) out over `keys`, failing fast on the first
    /// loader error.
    pub async fn get_all(&self, keys: &[&str]) -> CacheResult<HashMap<String, V>> {
        let loads = keys.iter().map(|key| {
            let key = (*key).to_string();
            async move {
                let value = self.get(&key).await?;
                Ok::<(String, V), crate::error::CacheError>((key, value))
            }
        });
        join_all(loads).await.into_iter().collect()
    }

    /// Inserts a value directly, bypassing the loader.
    pub fn put(&self, key: &str, value: V) {
        self.cache.set(key, value);
    }

    /// Inserts several values directly, bypassing the loader.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (String, V)>) {
        self.cache.set_all(entries);
    }

    /// Removes a mapping, returning its value.
    pub fn invalidate(&self, key: &str) -> Option<V> {
        self.cache.remove(key)
    }

    /// Forces a reload: invalidates the mapping and loads it again.
    pub async fn refresh(&self, key: &str) -> CacheResult<V> {
        self.invalidate(key);
        self.get(key).await
    }
}
