//! Cache configuration.
//!
//! [`CacheConfig`] is the bag of knobs consumed by
//! [`Cache::with_config`](crate::cache::Cache::with_config). The
//! [`CacheBuilder`](crate::builder::CacheBuilder) produces one of these from
//! its fluent surface.
//!
//! | Option | Effect |
//! |--------|--------|
//! | `default_ttl` | TTL applied when a `set` supplies none |
//! | `max_entries` | Capacity ceiling; the policy selects victims when exceeded |
//! | `auto_trim` + `auto_trim_interval` | Periodic expiration sweep |
//! | `eviction_policy` | Eviction discipline |
//! | `record_stats` | Installs a metrics collector |
//! | `enable_event_stream` | Installs an event bus |
//! | `stale_while_revalidate` + `stale_time` | Staleness window for `get_stale` |
//! | `on_evicted` | Invoked synchronously whenever an entry is destroyed |
//! | `removal_listener` | Invoked with a [`RemovalCause`] on every removal, including replacement |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked when an entry is destroyed for any reason.
///
/// Runs synchronously in the triggering operation's context and must not
/// re-enter the cache.
pub type EvictedCallback<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

/// Callback invoked on every removal with the cause attached.
///
/// Unlike [`EvictedCallback`], this also fires with
/// [`RemovalCause::Replaced`] when a `set` overwrites a live mapping.
pub type RemovalListener<V> = Arc<dyn Fn(&str, &V, RemovalCause) + Send + Sync>;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// `remove`, `remove_all`, `clear_where`, or a path removal.
    Explicit,
    /// A `set` overwrote a prior mapping. The prior value is reported.
    Replaced,
    /// Capacity enforcement selected the entry as a victim.
    Evicted,
    /// The entry's TTL elapsed.
    Expired,
    /// A `clear` (with or without a preserve set) removed the entry.
    Cleared,
}

impl RemovalCause {
    /// `true` when the entry was destroyed rather than superseded.
    pub fn is_destruction(self) -> bool {
        !matches!(self, RemovalCause::Replaced)
    }
}

/// Eviction discipline selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicyKind {
    /// Least Recently Used: strict access order, evict the coldest.
    #[default]
    Lru,
    /// Least Frequently Used: evict the lowest access count, oldest first
    /// among ties.
    Lfu,
    /// First In, First Out: evict in insertion order; accesses are ignored.
    Fifo,
    /// No bookkeeping; capacity enforcement never finds a victim.
    None,
}

/// Configuration consumed by [`Cache::with_config`](crate::cache::Cache::with_config).
#[derive(Clone)]
pub struct CacheConfig<V> {
    /// TTL applied when a `set` supplies none. `None` makes unqualified
    /// `set`s permanent.
    pub default_ttl: Option<Duration>,
    /// Capacity ceiling, counted over all mappings including expired ones
    /// not yet swept.
    pub max_entries: Option<u64>,
    /// Enables the periodic expiration sweep.
    pub auto_trim: bool,
    /// Period of the expiration sweep when `auto_trim` is set.
    pub auto_trim_interval: Duration,
    /// Eviction discipline used for capacity enforcement.
    pub eviction_policy: EvictionPolicyKind,
    /// Installs a metrics collector when `true`.
    pub record_stats: bool,
    /// Installs an event bus when `true`.
    pub enable_event_stream: bool,
    /// Enables the stale-while-revalidate read path.
    pub stale_while_revalidate: bool,
    /// Age beyond which `get_stale` serves the cached value and revalidates
    /// in the background. Falls back to half the default TTL, then five
    /// minutes.
    pub stale_time: Option<Duration>,
    /// Invoked synchronously whenever an entry is destroyed.
    pub on_evicted: Option<EvictedCallback<V>>,
    /// Invoked on every removal, replacement included, with the cause.
    pub removal_listener: Option<RemovalListener<V>>,
}

impl<V> Default for CacheConfig<V> {
    fn default() -> Self {
        CacheConfig {
            default_ttl: Some(Duration::from_secs(3600)),
            max_entries: None,
            auto_trim: false,
            auto_trim_interval: Duration::from_secs(60),
            eviction_policy: EvictionPolicyKind::default(),
            record_stats: false,
            enable_event_stream: false,
            stale_while_revalidate: false,
            stale_time: None,
            on_evicted: None,
            removal_listener: None,
        }
    }
}

impl<V> fmt::Debug for CacheConfig<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .field("auto_trim", &self.auto_trim)
            .field("auto_trim_interval", &self.auto_trim_interval)
            .field("eviction_policy", &self.eviction_policy)
            .field("record_stats", &self.record_stats)
            .field("enable_event_stream", &self.enable_event_stream)
            .field("stale_while_revalidate", &self.stale_while_revalidate)
            .field("stale_time", &self.stale_time)
            .field("on_evicted", &self.on_evicted.as_ref().map(|_| "<callback>"))
            .field(
                "removal_listener",
                &self.removal_listener.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}
