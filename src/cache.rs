//! The cache engine.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                         Cache<V>                             │
//!   │                                                              │
//!   │   ┌───────────────────────────────────────────────────────┐  │
//!   │   │        Mutex<State>  (the exclusive region)           │  │
//!   │   │                                                       │  │
//!   │   │   FxHashMap<String, Entry<V>>      Policy             │  │
//!   │   │   (value ownership)                (eviction order)   │  │
//!   │   └───────────────────────────────────────────────────────┘  │
//!   │                                                              │
//!   │   Metrics          EventBus           FlightGroup            │
//!   │   (counters)       (observers)        (SWR revalidation)     │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every state-mutating operation is an indivisible step: the entry map and
//! the policy mutate under one mutex, and callbacks plus event emission run
//! before the lock is released, so events are observed in commit order.
//! Synchronous operations never suspend; the asynchronous surface
//! (`get_or_set_async`, `get_stale`, `warm_up_async`) suspends only at
//! loader boundaries and re-checks preconditions afterwards.
//!
//! Callbacks (`on_evicted`, the removal listener) run synchronously inside
//! the triggering operation and must not re-enter the cache.
//!
//! ## Expiration
//!
//! Expiry is lazy plus optionally periodic. A `get`/`contains_key` that
//! touches an expired entry reclaims just that entry; `keys`, `len`,
//! `is_empty`, and `is_not_empty` sweep the whole store first; `auto_trim`
//! runs the same sweep on a timer. Capacity is compared against the total
//! mapping count, expired-but-unswept entries included.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::{CacheConfig, RemovalCause};
use crate::entry::Entry;
use crate::events::{CacheEvent, EventBus, EventSubscription};
use crate::flight::{Flight, FlightGroup};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::policy::{EvictionPolicy, Policy};

/// Separator joining path segments and namespace prefixes into flat keys.
///
/// Keys containing the separator share one namespace with composed path
/// keys; the collision is part of the key contract and is not escaped.
pub const PATH_SEPARATOR: &str = "::";

/// Staleness window used by [`Cache::get_stale`] when neither the call nor
/// the configuration supplies one and no default TTL is set.
const STALE_FALLBACK: Duration = Duration::from_secs(300);

/// Entry population counts returned by [`Cache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// All mappings, expired-but-unswept included.
    pub total: u64,
    /// Mappings whose entries are currently valid.
    pub valid: u64,
    /// Mappings whose entries have expired but were not yet reclaimed.
    pub expired: u64,
    /// Valid mappings with no expiration.
    pub permanent: u64,
}

struct State<V> {
    entries: FxHashMap<String, Entry<V>>,
    policy: Policy,
}

struct Shared<V> {
    state: Mutex<State<V>>,
    config: CacheConfig<V>,
    metrics: Metrics,
    events: RwLock<Option<EventBus<V>>>,
    revalidations: FlightGroup<V>,
    trim_task: Mutex<Option<JoinHandle<()>>>,
}

impl<V> Drop for Shared<V> {
    fn drop(&mut self) {
        if let Some(task) = self.trim_task.get_mut().take() {
            task.abort();
        }
    }
}

/// General-purpose in-process cache with TTLs, eviction, and events.
///
/// Handles are cheap to clone and share one underlying cache.
pub struct Cache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Cache {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with the default configuration.
    pub fn new() -> Self {
        Cache::with_config(CacheConfig::default())
    }

    /// Creates a cache from an explicit configuration.
    ///
    /// When `auto_trim` is set and a tokio runtime is current, a periodic
    /// sweep task is started; without a runtime the sweep is disabled with
    /// a warning and lazy expiration still applies.
    pub fn with_config(config: CacheConfig<V>) -> Self {
        let metrics = if config.record_stats {
            Metrics::enabled()
        } else {
            Metrics::disabled()
        };
        let events = if config.enable_event_stream {
            Some(EventBus::new())
        } else {
            None
        };
        let auto_trim = config.auto_trim;
        let interval = config.auto_trim_interval;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                entries: FxHashMap::default(),
                policy: Policy::new(config.eviction_policy),
            }),
            config,
            metrics,
            events: RwLock::new(events),
            revalidations: FlightGroup::new(),
            trim_task: Mutex::new(None),
        });

        if auto_trim {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let weak = Arc::downgrade(&shared);
                    let task = handle.spawn(async move {
                        let mut ticker = tokio::time::interval(interval);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        // The first tick completes immediately.
                        ticker.tick().await;
                        loop {
                            ticker.tick().await;
                            let Some(shared) = weak.upgrade() else { break };
                            let removed = (Cache { shared }).trim_expired();
                            if removed > 0 {
                                debug!(removed, "periodic sweep reclaimed expired entries");
                            }
                        }
                    });
                    *shared.trim_task.lock() = Some(task);
                }
                Err(_) => {
                    warn!("auto_trim enabled outside a tokio runtime; periodic sweep disabled");
                }
            }
        }

        Cache { shared }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig<V> {
        &self.shared.config
    }

    // -- events and metrics ------------------------------------------------

    /// Opens an event subscription, or `None` when the event stream is
    /// disabled.
    pub fn subscribe(&self) -> Option<EventSubscription<V>> {
        self.shared.events.read().as_ref().map(EventBus::subscribe)
    }

    /// Snapshot of the metrics counters; all zeros when stats are disabled.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Entry population counts. Does not sweep.
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = CacheStats {
            total: state.entries.len() as u64,
            ..CacheStats::default()
        };
        for entry in state.entries.values() {
            if entry.is_valid() {
                stats.valid += 1;
                if entry.is_permanent() {
                    stats.permanent += 1;
                }
            } else {
                stats.expired += 1;
            }
        }
        stats
    }

    fn emit(&self, make: impl FnOnce() -> CacheEvent<V>) {
        if let Some(bus) = self.shared.events.read().as_ref() {
            bus.emit(make());
        }
    }

    fn notify_removal(&self, key: &str, value: &V, cause: RemovalCause) {
        if cause.is_destruction() {
            if let Some(on_evicted) = &self.shared.config.on_evicted {
                on_evicted(key, value);
            }
        }
        if let Some(listener) = &self.shared.config.removal_listener {
            listener(key, value, cause);
        }
    }

    // -- basic operations --------------------------------------------------

    /// Looks up a value, refreshing its position in the eviction order.
    ///
    /// An expired mapping is reclaimed on the spot: it emits `Expired`,
    /// invokes the destruction callbacks, and reads as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let started = Instant::now();
        let mut state = self.shared.state.lock();

        enum Lookup<V> {
            Miss,
            Expired,
            Hit(V),
        }
        let lookup = match state.entries.get(key) {
            None => Lookup::Miss,
            Some(entry) if entry.is_expired() => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.value().clone()),
        };

        let result = match lookup {
            Lookup::Hit(value) => {
                state.policy.on_access(key);
                self.shared.metrics.record_hit();
                Some(value)
            }
            Lookup::Expired => {
                self.reap_expired(&mut state, key);
                self.shared.metrics.record_miss();
                None
            }
            Lookup::Miss => {
                self.shared.metrics.record_miss();
                None
            }
        };
        drop(state);
        self.shared.metrics.record_get_latency(started.elapsed());
        result
    }

    /// Looks up a value, falling back to `default`.
    pub fn get_or(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Looks up a value, computing and caching it on a miss with the
    /// default TTL.
    ///
    /// Not single-flight: concurrent callers may each invoke `compute`.
    /// Use [`LoadingCache`](crate::loading::LoadingCache) for deduplicated
    /// loads.
    pub fn get_or_set(&self, key: &str, compute: impl FnOnce() -> V) -> V {
        self.get_or_set_opt(key, compute, self.shared.config.default_ttl)
    }

    /// [`get_or_set`](Self::get_or_set) with an explicit TTL for the
    /// computed value.
    pub fn get_or_set_with_ttl(
        &self,
        key: &str,
        compute: impl FnOnce() -> V,
        ttl: Duration,
    ) -> V {
        self.get_or_set_opt(key, compute, Some(ttl))
    }

    fn get_or_set_opt(
        &self,
        key: &str,
        compute: impl FnOnce() -> V,
        ttl: Option<Duration>,
    ) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set_opt(key, value.clone(), ttl);
        value
    }

    /// Asynchronous [`get_or_set`](Self::get_or_set).
    ///
    /// After awaiting `compute` the lookup is re-checked; a value cached by
    /// a concurrent caller during the await wins and the computed value is
    /// discarded.
    pub async fn get_or_set_async<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_set_async_opt(key, compute, self.shared.config.default_ttl)
            .await
    }

    /// [`get_or_set_async`](Self::get_or_set_async) with an explicit TTL.
    pub async fn get_or_set_async_with_ttl<F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Duration,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_set_async_opt(key, compute, Some(ttl)).await
    }

    async fn get_or_set_async_opt<F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute().await;
        if let Some(existing) = self.get(key) {
            return existing;
        }
        self.set_opt(key, value.clone(), ttl);
        value
    }

    /// Inserts or replaces a mapping with the default TTL.
    ///
    /// Emits `Created` for a fresh key or `Updated` (carrying the prior
    /// value) for an overwrite, then enforces `max_entries`.
    pub fn set(&self, key: &str, value: V) {
        self.set_opt(key, value, self.shared.config.default_ttl);
    }

    /// Inserts or replaces a mapping with an explicit TTL.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.set_opt(key, value, Some(ttl));
    }

    /// Inserts or replaces a mapping that never expires.
    pub fn set_permanent(&self, key: &str, value: V) {
        self.set_opt(key, value, None);
    }

    fn set_opt(&self, key: &str, value: V, ttl: Option<Duration>) {
        let started = Instant::now();
        let event_value = self.shared.events.read().is_some().then(|| value.clone());
        let entry = Entry::new(value, ttl);

        let mut state = self.shared.state.lock();
        let previous = state.entries.insert(key.to_string(), entry);
        state.policy.on_add(key);
        self.shared.metrics.record_put();

        match previous {
            Some(prev) => {
                if let Some(listener) = &self.shared.config.removal_listener {
                    listener(key, prev.value(), RemovalCause::Replaced);
                }
                if let Some(value) = event_value {
                    self.emit(|| CacheEvent::updated(key, value, prev.into_value()));
                }
            }
            None => {
                if let Some(value) = event_value {
                    self.emit(|| CacheEvent::created(key, value));
                }
            }
        }

        self.enforce_capacity(&mut state);
        drop(state);
        self.shared.metrics.record_put_latency(started.elapsed());
    }

    /// Checks for a valid mapping. An expired mapping is reclaimed as in
    /// [`get`](Self::get), but no miss is recorded.
    pub fn contains_key(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock();
        let expired = match state.entries.get(key) {
            None => return false,
            Some(entry) => entry.is_expired(),
        };
        if expired {
            self.reap_expired(&mut state, key);
            return false;
        }
        true
    }

    /// Removes a mapping, returning its value.
    ///
    /// A second removal of the same key returns `None` and emits nothing.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut state = self.shared.state.lock();
        self.remove_locked(&mut state, key, RemovalCause::Explicit)
            .map(Entry::into_value)
    }

    // -- path operations ---------------------------------------------------

    /// Looks up the value under the composed path key. Empty paths read as
    /// absent.
    pub fn get_path(&self, segments: &[&str]) -> Option<V> {
        self.get(&join_path(segments)?)
    }

    /// Writes under the composed path key with the default TTL. Empty
    /// paths are a no-op.
    pub fn set_path(&self, segments: &[&str], value: V) {
        if let Some(key) = join_path(segments) {
            self.set(&key, value);
        }
    }

    /// Checks the composed path key.
    pub fn contains_path(&self, segments: &[&str]) -> bool {
        join_path(segments).is_some_and(|key| self.contains_key(&key))
    }

    /// Removes the composed path key.
    pub fn remove_path(&self, segments: &[&str]) -> Option<V> {
        self.remove(&join_path(segments)?)
    }

    /// Lists live keys starting with `prefix`, sweeping expired entries
    /// first.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut state = self.shared.state.lock();
        self.trim_expired_locked(&mut state);
        state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Removes every mapping whose key starts with `prefix`, returning the
    /// count.
    pub fn remove_with_prefix(&self, prefix: &str) -> u64 {
        let mut state = self.shared.state.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.remove_locked(&mut state, key, RemovalCause::Explicit);
        }
        doomed.len() as u64
    }

    // -- bulk operations ---------------------------------------------------

    /// Looks up several keys at once; absent and expired keys are simply
    /// missing from the result.
    pub fn get_all(&self, keys: &[&str]) -> HashMap<String, V> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| ((*key).to_string(), value)))
            .collect()
    }

    /// Inserts several mappings with the default TTL, one event each.
    pub fn set_all(&self, entries: impl IntoIterator<Item = (String, V)>) {
        for (key, value) in entries {
            self.set(&key, value);
        }
    }

    /// Removes several keys, returning how many mappings existed.
    pub fn remove_all(&self, keys: &[&str]) -> u64 {
        let mut state = self.shared.state.lock();
        let mut removed = 0;
        for key in keys {
            if self
                .remove_locked(&mut state, key, RemovalCause::Explicit)
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    // -- enumeration -------------------------------------------------------

    /// Live keys, after sweeping expired entries.
    pub fn keys(&self) -> Vec<String> {
        let mut state = self.shared.state.lock();
        self.trim_expired_locked(&mut state);
        state.entries.keys().cloned().collect()
    }

    /// Number of live entries, after sweeping expired entries.
    pub fn len(&self) -> usize {
        let mut state = self.shared.state.lock();
        self.trim_expired_locked(&mut state);
        state.entries.len()
    }

    /// `true` when no live entries remain, after sweeping.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when at least one live entry remains, after sweeping.
    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    // -- clearing ----------------------------------------------------------

    /// Removes every mapping, emitting a single `Cleared` event when the
    /// cache was non-empty. Destruction callbacks still run per entry.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        if state.entries.is_empty() {
            return;
        }
        let drained: Vec<(String, Entry<V>)> = state.entries.drain().collect();
        state.policy.clear();
        for (key, entry) in &drained {
            self.notify_removal(key, entry.value(), RemovalCause::Cleared);
        }
        self.emit(CacheEvent::cleared);
    }

    /// Removes every mapping except the preserved keys, emitting
    /// individual `Removed` events. An empty preserve set behaves exactly
    /// like [`clear`](Self::clear).
    pub fn clear_preserving(&self, preserve: &[&str]) {
        if preserve.is_empty() {
            return self.clear();
        }
        let keep: FxHashSet<&str> = preserve.iter().copied().collect();
        let mut state = self.shared.state.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| !keep.contains(key.as_str()))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(entry) = state.entries.remove(key) {
                state.policy.on_remove(key);
                self.notify_removal(key, entry.value(), RemovalCause::Cleared);
                self.emit(|| CacheEvent::removed(key, entry.value().clone()));
            }
        }
    }

    /// Removes the valid entries matching `predicate`, returning the
    /// count. Expired entries are left for the sweep.
    pub fn clear_where(&self, predicate: impl Fn(&str, &V) -> bool) -> u64 {
        let mut state = self.shared.state.lock();
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| entry.is_valid() && predicate(key, entry.value()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.remove_locked(&mut state, key, RemovalCause::Explicit);
        }
        doomed.len() as u64
    }

    // -- expiration --------------------------------------------------------

    /// Sweeps the whole store, reclaiming every expired entry and
    /// returning the count. Each reclaimed entry emits `Expired` and runs
    /// the destruction callbacks.
    pub fn trim_expired(&self) -> u64 {
        let mut state = self.shared.state.lock();
        self.trim_expired_locked(&mut state)
    }

    fn trim_expired_locked(&self, state: &mut State<V>) -> u64 {
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.reap_expired(state, key);
        }
        expired.len() as u64
    }

    fn reap_expired(&self, state: &mut State<V>, key: &str) -> Option<Entry<V>> {
        let entry = state.entries.remove(key)?;
        state.policy.on_remove(key);
        self.shared.metrics.record_expiration();
        self.notify_removal(key, entry.value(), RemovalCause::Expired);
        self.emit(|| CacheEvent::expired(key, entry.value().clone()));
        Some(entry)
    }

    // -- entry introspection -----------------------------------------------

    /// The full entry for a valid mapping, without touching the eviction
    /// order.
    pub fn get_entry(&self, key: &str) -> Option<Entry<V>> {
        let state = self.shared.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .cloned()
    }

    /// Remaining TTL of a valid mapping; `None` for absent, expired, or
    /// permanent entries.
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let state = self.shared.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .and_then(Entry::ttl_remaining)
    }

    /// Age of a valid mapping.
    pub fn get_age(&self, key: &str) -> Option<Duration> {
        let state = self.shared.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(Entry::age)
    }

    // -- TTL manipulation --------------------------------------------------

    /// Pushes a valid mapping's expiration out by `additional`; a
    /// permanent mapping becomes timed, expiring `additional` from now.
    /// Returns `false` for absent or expired mappings.
    pub fn extend_ttl(&self, key: &str, additional: Duration) -> bool {
        let mut state = self.shared.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.is_valid() => {
                entry.extend_ttl(additional);
                true
            }
            _ => false,
        }
    }

    /// Rebuilds a valid mapping with a fresh creation time and the default
    /// TTL. Returns `false` for absent or expired mappings.
    pub fn refresh(&self, key: &str) -> bool {
        self.refresh_opt(key, self.shared.config.default_ttl)
    }

    /// [`refresh`](Self::refresh) with an explicit TTL.
    pub fn refresh_with_ttl(&self, key: &str, ttl: Duration) -> bool {
        self.refresh_opt(key, Some(ttl))
    }

    fn refresh_opt(&self, key: &str, ttl: Option<Duration>) -> bool {
        let mut state = self.shared.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.is_valid() => {
                let value = entry.value().clone();
                *entry = Entry::new(value, ttl);
                true
            }
            _ => false,
        }
    }

    // -- stale-while-revalidate --------------------------------------------

    /// Serves the cached value immediately, revalidating in the background
    /// once the entry's age exceeds the staleness window.
    ///
    /// - absent or expired: awaits `revalidate`, caches, returns fresh;
    /// - stale (age beyond the window): returns the cached value and, when
    ///   no revalidation for this key is in flight, spawns one that caches
    ///   on completion (single-flight per key);
    /// - fresh: returns the cached value.
    ///
    /// The window is the configured `stale_time`, else half the default
    /// TTL, else five minutes. Without the `stale_while_revalidate`
    /// config flag every valid entry is served as fresh;
    /// [`get_stale_with_ttl`](Self::get_stale_with_ttl) opts in
    /// explicitly.
    pub async fn get_stale<F, Fut>(&self, key: &str, revalidate: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.get_stale_opt(key, revalidate, None).await
    }

    /// [`get_stale`](Self::get_stale) with an explicit staleness window.
    pub async fn get_stale_with_ttl<F, Fut>(
        &self,
        key: &str,
        revalidate: F,
        stale_ttl: Duration,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.get_stale_opt(key, revalidate, Some(stale_ttl)).await
    }

    async fn get_stale_opt<F, Fut>(
        &self,
        key: &str,
        revalidate: F,
        stale_ttl: Option<Duration>,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        enum Served<V> {
            Missing,
            Fresh(V),
            Stale(V),
        }

        // An explicit window always opts in; otherwise the config flag
        // decides whether staleness is checked at all.
        let window = match stale_ttl {
            Some(ttl) => Some(ttl),
            None if self.shared.config.stale_while_revalidate => Some(self.effective_stale()),
            None => None,
        };
        let served = {
            let mut state = self.shared.state.lock();
            let lookup = match state.entries.get(key) {
                None => {
                    self.shared.metrics.record_miss();
                    Served::Missing
                }
                Some(entry) if entry.is_expired() => {
                    self.reap_expired(&mut state, key);
                    self.shared.metrics.record_miss();
                    Served::Missing
                }
                Some(entry) if window.is_some_and(|window| entry.age() > window) => {
                    Served::Stale(entry.value().clone())
                }
                Some(entry) => Served::Fresh(entry.value().clone()),
            };
            if matches!(lookup, Served::Fresh(_) | Served::Stale(_)) {
                state.policy.on_access(key);
                self.shared.metrics.record_hit();
            }
            lookup
        };

        match served {
            Served::Fresh(value) => value,
            Served::Stale(value) => {
                if let Flight::Leader(guard) = self.shared.revalidations.join(key) {
                    let cache = self.clone();
                    let key = key.to_string();
                    let refresh = revalidate();
                    tokio::spawn(async move {
                        let fresh = refresh.await;
                        cache.set(&key, fresh.clone());
                        guard.complete(Ok(fresh));
                    });
                }
                value
            }
            Served::Missing => {
                let value = revalidate().await;
                self.set(key, value.clone());
                value
            }
        }
    }

    fn effective_stale(&self) -> Duration {
        self.shared
            .config
            .stale_time
            .or(self.shared.config.default_ttl.map(|ttl| ttl / 2))
            .unwrap_or(STALE_FALLBACK)
    }

    /// `true` while a background revalidation for `key` is in flight.
    pub fn is_revalidating(&self, key: &str) -> bool {
        self.shared.revalidations.is_in_flight(key)
    }

    // -- warming -----------------------------------------------------------

    /// Bulk pre-population with the default TTL.
    pub fn warm_up(&self, entries: impl IntoIterator<Item = (String, V)>) {
        for (key, value) in entries {
            self.set(&key, value);
        }
    }

    /// Bulk pre-population with an explicit TTL.
    pub fn warm_up_with_ttl(
        &self,
        entries: impl IntoIterator<Item = (String, V)>,
        ttl: Duration,
    ) {
        for (key, value) in entries {
            self.set_with_ttl(&key, value, ttl);
        }
    }

    /// Loads every key concurrently and caches the results with the
    /// default TTL.
    pub async fn warm_up_async<F, Fut>(&self, keys: Vec<String>, loader: F)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = V>,
    {
        self.warm_up_async_opt(keys, loader, self.shared.config.default_ttl)
            .await
    }

    /// [`warm_up_async`](Self::warm_up_async) with an explicit TTL.
    pub async fn warm_up_async_with_ttl<F, Fut>(&self, keys: Vec<String>, loader: F, ttl: Duration)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = V>,
    {
        self.warm_up_async_opt(keys, loader, Some(ttl)).await
    }

    async fn warm_up_async_opt<F, Fut>(&self, keys: Vec<String>, loader: F, ttl: Option<Duration>)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = V>,
    {
        let loads = keys.into_iter().map(|key| {
            let load = loader(key.clone());
            async move { (key, load.await) }
        });
        for (key, value) in join_all(loads).await {
            self.set_opt(&key, value, ttl);
        }
    }

    // -- lifecycle ---------------------------------------------------------

    /// Shuts the cache down: cancels the periodic sweep, closes the event
    /// bus, clears the revalidation table, and clears the store.
    /// Destruction callbacks run for the cleared entries; no events are
    /// emitted since the bus is already closed.
    pub fn dispose(&self) {
        if let Some(task) = self.shared.trim_task.lock().take() {
            task.abort();
        }
        let bus = self.shared.events.write().take();
        drop(bus);
        self.shared.revalidations.clear();

        let mut state = self.shared.state.lock();
        let drained: Vec<(String, Entry<V>)> = state.entries.drain().collect();
        state.policy.clear();
        drop(state);
        for (key, entry) in &drained {
            self.notify_removal(key, entry.value(), RemovalCause::Cleared);
        }
    }

    // -- internals ---------------------------------------------------------

    fn remove_locked(
        &self,
        state: &mut State<V>,
        key: &str,
        cause: RemovalCause,
    ) -> Option<Entry<V>> {
        let entry = state.entries.remove(key)?;
        state.policy.on_remove(key);
        self.shared.metrics.record_remove();
        self.notify_removal(key, entry.value(), cause);
        self.emit(|| CacheEvent::removed(key, entry.value().clone()));
        Some(entry)
    }

    fn enforce_capacity(&self, state: &mut State<V>) {
        let Some(max_entries) = self.shared.config.max_entries else {
            return;
        };
        while state.entries.len() as u64 > max_entries {
            let Some(victim) = state.policy.eviction_candidate() else {
                break;
            };
            state.policy.on_remove(&victim);
            let Some(entry) = state.entries.remove(&victim) else {
                continue;
            };
            self.shared.metrics.record_eviction();
            self.notify_removal(&victim, entry.value(), RemovalCause::Evicted);
            self.emit(|| CacheEvent::evicted(&victim, entry.value().clone()));
        }
    }
}

impl<V> Default for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Cache::new()
    }
}

fn join_path(segments: &[&str]) -> Option<String> {
    if segments.is_empty() {
        None
    } else {
        Some(segments.join(PATH_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicyKind;

    fn tiny_ttl_config() -> CacheConfig<u32> {
        CacheConfig {
            default_ttl: Some(Duration::from_millis(20)),
            ..CacheConfig::default()
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = Cache::new();
        cache.set("a", 1u32);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn default_ttl_applies_to_unqualified_sets() {
        let cache: Cache<u32> = Cache::new();
        cache.set("a", 1);
        assert!(cache.time_to_live("a").is_some());
        cache.set_permanent("b", 2);
        assert!(cache.time_to_live("b").is_none());
        assert!(cache.get_entry("b").unwrap().is_permanent());
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let cache = Cache::with_config(tiny_ttl_config());
        cache.set("a", 1);
        assert_eq!(cache.get("a"), Some(1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("a"), None);
        // The reap removed the mapping entirely.
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn contains_key_reaps_expired_entries() {
        let cache = Cache::with_config(tiny_ttl_config());
        cache.set("a", 1);
        assert!(cache.contains_key("a"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains_key("a"));
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn contains_key_reap_records_no_miss() {
        let cache = Cache::with_config(CacheConfig {
            default_ttl: Some(Duration::from_millis(10)),
            record_stats: true,
            ..CacheConfig::default()
        });
        cache.set("a", 1);
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.contains_key("a"));

        let snap = cache.metrics_snapshot();
        assert_eq!(snap.misses, 0);
        assert_eq!(snap.expirations, 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = Cache::new();
        cache.set("a", 1u32);
        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);
    }

    #[test]
    fn get_or_set_computes_once_per_miss() {
        let cache = Cache::new();
        let mut calls = 0;
        let value = cache.get_or_set("a", || {
            calls += 1;
            7u32
        });
        assert_eq!(value, 7);
        assert_eq!(cache.get_or_set("a", || unreachable!()), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn trim_expired_returns_exact_count() {
        let cache: Cache<u32> = Cache::new();
        cache.set_with_ttl("a", 1, Duration::from_millis(10));
        cache.set_with_ttl("b", 2, Duration::from_millis(10));
        cache.set_permanent("c", 3);

        std::thread::sleep(Duration::from_millis(30));
        let before = cache.stats().total;
        assert_eq!(cache.trim_expired(), 2);
        assert_eq!(cache.stats().total, before - 2);
        assert_eq!(cache.trim_expired(), 0);
    }

    #[test]
    fn len_and_keys_sweep_first() {
        let cache: Cache<u32> = Cache::new();
        cache.set_with_ttl("a", 1, Duration::from_millis(10));
        cache.set_permanent("b", 2);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys(), vec!["b".to_string()]);
        assert!(cache.is_not_empty());
    }

    #[test]
    fn stats_classify_entries() {
        let cache: Cache<u32> = Cache::new();
        cache.set_with_ttl("a", 1, Duration::from_secs(1800));
        cache.set("b", 2);
        cache.set_permanent("c", 3);

        let stats = cache.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.permanent, 1);
    }

    #[test]
    fn extend_ttl_on_permanent_makes_it_timed() {
        let cache: Cache<u32> = Cache::new();
        cache.set_permanent("a", 1);
        assert!(cache.extend_ttl("a", Duration::from_secs(60)));
        let remaining = cache.time_to_live("a").unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
    }

    #[test]
    fn extend_ttl_rejects_absent_and_expired() {
        let cache: Cache<u32> = Cache::new();
        assert!(!cache.extend_ttl("missing", Duration::from_secs(1)));

        cache.set_with_ttl("a", 1, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.extend_ttl("a", Duration::from_secs(1)));
    }

    #[test]
    fn refresh_restarts_the_clock() {
        let cache: Cache<u32> = Cache::new();
        cache.set_with_ttl("a", 1, Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.refresh_with_ttl("a", Duration::from_secs(10)));

        let age = cache.get_age("a").unwrap();
        assert!(age < Duration::from_millis(20));
        assert!(!cache.refresh("missing"));
    }

    #[test]
    fn path_operations_compose_segments() {
        let cache: Cache<u32> = Cache::new();
        cache.set_path(&["users", "42", "profile"], 7);
        assert_eq!(cache.get("users::42::profile"), Some(7));
        assert_eq!(cache.get_path(&["users", "42", "profile"]), Some(7));
        assert!(cache.contains_path(&["users", "42", "profile"]));
        assert_eq!(cache.remove_path(&["users", "42", "profile"]), Some(7));
        assert_eq!(cache.get_path(&["users", "42", "profile"]), None);
    }

    #[test]
    fn empty_paths_are_inert() {
        let cache: Cache<u32> = Cache::new();
        cache.set_path(&[], 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_path(&[]), None);
        assert!(!cache.contains_path(&[]));
        assert_eq!(cache.remove_path(&[]), None);
    }

    #[test]
    fn prefix_operations() {
        let cache: Cache<u32> = Cache::new();
        cache.set("users::1", 1);
        cache.set("users::2", 2);
        cache.set("sessions::1", 3);

        let mut keys = cache.keys_with_prefix("users::");
        keys.sort();
        assert_eq!(keys, ["users::1", "users::2"]);

        assert_eq!(cache.remove_with_prefix("users::"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bulk_operations() {
        let cache: Cache<u32> = Cache::new();
        cache.set_all([("a".to_string(), 1), ("b".to_string(), 2)]);

        let found = cache.get_all(&["a", "b", "missing"]);
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], 1);

        assert_eq!(cache.remove_all(&["a", "b", "missing"]), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_preserving_keeps_named_keys() {
        let cache: Cache<u32> = Cache::new();
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        cache.clear_preserving(&["b"]);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), None);
    }

    #[test]
    fn clear_where_skips_expired_entries() {
        let cache: Cache<u32> = Cache::new();
        cache.set_permanent("keep", 1);
        cache.set_permanent("drop", 10);
        cache.set_with_ttl("expired", 10, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.clear_where(|_, value| *value >= 10), 1);
        assert_eq!(cache.get("keep"), Some(1));
        assert_eq!(cache.get("drop"), None);
    }

    #[test]
    fn on_evicted_fires_once_per_destruction() {
        use std::sync::atomic::{AtomicU64, Ordering};
        let destroyed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&destroyed);
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            default_ttl: Some(Duration::from_millis(10)),
            max_entries: Some(2),
            on_evicted: Some(Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..CacheConfig::default()
        });

        cache.set_permanent("a", 1);
        cache.set_permanent("b", 2);
        cache.set_permanent("c", 3); // evicts one
        cache.remove("c");
        cache.set("d", 4);
        std::thread::sleep(Duration::from_millis(30));
        cache.trim_expired(); // expires d
        cache.clear(); // clears the survivor

        assert_eq!(destroyed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn removal_listener_sees_replacement() {
        use parking_lot::Mutex as PlMutex;
        let causes: Arc<PlMutex<Vec<RemovalCause>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&causes);
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            removal_listener: Some(Arc::new(move |_, _, cause| {
                sink.lock().push(cause);
            })),
            ..CacheConfig::default()
        });

        cache.set("a", 1);
        cache.set("a", 2);
        cache.remove("a");

        assert_eq!(
            causes.lock().as_slice(),
            [RemovalCause::Replaced, RemovalCause::Explicit]
        );
    }

    #[test]
    fn capacity_counts_expired_entries() {
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            max_entries: Some(2),
            eviction_policy: EvictionPolicyKind::Fifo,
            ..CacheConfig::default()
        });
        cache.set_with_ttl("a", 1, Duration::from_millis(5));
        cache.set_permanent("b", 2);
        std::thread::sleep(Duration::from_millis(20));

        // "a" is expired but unswept, so inserting "c" exceeds capacity and
        // evicts the FIFO head ("a").
        cache.set_permanent("c", 3);
        assert_eq!(cache.stats().total, 2);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn none_policy_never_evicts() {
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            max_entries: Some(1),
            eviction_policy: EvictionPolicyKind::None,
            ..CacheConfig::default()
        });
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.stats().total, 3);
    }

    #[test]
    fn metrics_track_hits_and_misses() {
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            record_stats: true,
            ..CacheConfig::default()
        });
        cache.set("a", 1);
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let snap = cache.metrics_snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.puts, 1);
        assert!(snap.get_latency.samples >= 3);
    }

    #[tokio::test]
    async fn get_or_set_async_rechecks_after_await() {
        let cache: Cache<u32> = Cache::new();
        let other = cache.clone();
        let value = cache
            .get_or_set_async("a", move || async move {
                // Simulates a concurrent caller winning the race mid-await.
                other.set("a", 99);
                1
            })
            .await;
        assert_eq!(value, 99);
        assert_eq!(cache.get("a"), Some(99));
    }

    #[tokio::test]
    async fn dispose_closes_the_event_stream() {
        let cache: Cache<u32> = Cache::with_config(CacheConfig {
            enable_event_stream: true,
            ..CacheConfig::default()
        });
        cache.set("a", 1);
        let mut sub = cache.subscribe().unwrap();
        cache.dispose();

        assert!(cache.subscribe().is_none());
        assert_eq!(cache.stats().total, 0);
        // Drain anything emitted before disposal, then observe closure.
        while let Some(event) = sub.recv().await {
            assert_eq!(event.key, "a");
        }
    }
}
