//! Lifecycle event stream.
//!
//! Every state-mutating cache operation can be observed through a broadcast
//! of [`CacheEvent`] values. Events are delivered in the order their
//! triggering operations committed; a late subscriber sees only
//! post-subscription events, and a slow subscriber that falls behind the
//! channel capacity loses the oldest events (logged, never blocking the
//! cache).
//!
//! Subscriptions carry their own filter chain, so narrowing composes
//! without changing the element type:
//!
//! ```ignore
//! let mut evictions = cache.subscribe().unwrap().evictions().where_key_prefix("users::");
//! while let Some(event) = evictions.recv().await { /* ... */ }
//! ```

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Discriminant of a [`CacheEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventKind {
    /// A key was inserted for the first time.
    Created,
    /// An existing mapping was overwritten; the prior value is attached.
    Updated,
    /// A mapping was removed explicitly.
    Removed,
    /// A mapping was reclaimed because its TTL elapsed.
    Expired,
    /// A mapping was removed by capacity enforcement.
    Evicted,
    /// The whole cache was cleared at once. The key is empty.
    Cleared,
}

/// A single observed cache mutation.
#[derive(Debug, Clone)]
pub struct CacheEvent<V> {
    /// What happened.
    pub kind: CacheEventKind,
    /// Affected key; empty for [`CacheEventKind::Cleared`].
    pub key: String,
    /// Current value where meaningful (absent for `Cleared`).
    pub value: Option<V>,
    /// Prior value, only for [`CacheEventKind::Updated`].
    pub previous: Option<V>,
    /// Emission timestamp.
    pub at: DateTime<Utc>,
}

impl<V> CacheEvent<V> {
    fn new(kind: CacheEventKind, key: String, value: Option<V>, previous: Option<V>) -> Self {
        CacheEvent {
            kind,
            key,
            value,
            previous,
            at: Utc::now(),
        }
    }

    pub(crate) fn created(key: &str, value: V) -> Self {
        CacheEvent::new(CacheEventKind::Created, key.to_string(), Some(value), None)
    }

    pub(crate) fn updated(key: &str, value: V, previous: V) -> Self {
        CacheEvent::new(
            CacheEventKind::Updated,
            key.to_string(),
            Some(value),
            Some(previous),
        )
    }

    pub(crate) fn removed(key: &str, value: V) -> Self {
        CacheEvent::new(CacheEventKind::Removed, key.to_string(), Some(value), None)
    }

    pub(crate) fn expired(key: &str, value: V) -> Self {
        CacheEvent::new(CacheEventKind::Expired, key.to_string(), Some(value), None)
    }

    pub(crate) fn evicted(key: &str, value: V) -> Self {
        CacheEvent::new(CacheEventKind::Evicted, key.to_string(), Some(value), None)
    }

    pub(crate) fn cleared() -> Self {
        CacheEvent::new(CacheEventKind::Cleared, String::new(), None, None)
    }
}

/// Broadcast channel of [`CacheEvent`]s with a filtering subscription
/// surface.
#[derive(Debug)]
pub struct EventBus<V> {
    tx: broadcast::Sender<CacheEvent<V>>,
}

impl<V: Clone + Send + 'static> EventBus<V> {
    /// Creates a bus with the default channel capacity.
    pub fn new() -> Self {
        EventBus::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus whose slow subscribers may lag by at most `capacity`
    /// events before losing the oldest.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Publishes an event to all current subscribers. A bus with no
    /// subscribers drops the event.
    pub fn emit(&self, event: CacheEvent<V>) {
        let _ = self.tx.send(event);
    }

    /// Opens an unfiltered subscription delivering every event emitted from
    /// this point on.
    pub fn subscribe(&self) -> EventSubscription<V> {
        EventSubscription {
            rx: self.tx.subscribe(),
            filters: Vec::new(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<V: Clone + Send + 'static> Default for EventBus<V> {
    fn default() -> Self {
        EventBus::new()
    }
}

type EventFilter<V> = Box<dyn Fn(&CacheEvent<V>) -> bool + Send + Sync>;

/// A live subscription to an [`EventBus`], optionally narrowed by filters.
///
/// Filters compose: each `where_*` method consumes the subscription and
/// returns it with one more predicate attached. [`recv`](Self::recv) skips
/// events that fail any predicate.
pub struct EventSubscription<V> {
    rx: broadcast::Receiver<CacheEvent<V>>,
    filters: Vec<EventFilter<V>>,
}

impl<V: Clone + Send + 'static> EventSubscription<V> {
    /// Keeps only events of the given kind.
    pub fn where_type(mut self, kind: CacheEventKind) -> Self {
        self.filters.push(Box::new(move |event| event.kind == kind));
        self
    }

    /// Keeps only events for exactly this key.
    pub fn where_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.filters.push(Box::new(move |event| event.key == key));
        self
    }

    /// Keeps only events whose key starts with `prefix`.
    pub fn where_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.filters
            .push(Box::new(move |event| event.key.starts_with(&prefix)));
        self
    }

    /// Keeps insertions and overwrites.
    pub fn additions(mut self) -> Self {
        self.filters.push(Box::new(|event| {
            matches!(event.kind, CacheEventKind::Created | CacheEventKind::Updated)
        }));
        self
    }

    /// Keeps explicit removals.
    pub fn removals(self) -> Self {
        self.where_type(CacheEventKind::Removed)
    }

    /// Keeps TTL expirations.
    pub fn expirations(self) -> Self {
        self.where_type(CacheEventKind::Expired)
    }

    /// Keeps capacity evictions.
    pub fn evictions(self) -> Self {
        self.where_type(CacheEventKind::Evicted)
    }

    fn matches(&self, event: &CacheEvent<V>) -> bool {
        self.filters.iter().all(|filter| filter(event))
    }

    /// Awaits the next matching event. Returns `None` once the bus is
    /// closed (the cache was disposed or dropped).
    pub async fn recv(&mut self) -> Option<CacheEvent<V>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged; oldest events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). Returns `None` when no
    /// matching event is immediately available.
    pub fn try_recv(&mut self) -> Option<CacheEvent<V>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged; oldest events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_post_subscription_events() {
        let bus: EventBus<u32> = EventBus::new();
        bus.emit(CacheEvent::created("before", 0));

        let mut sub = bus.subscribe();
        bus.emit(CacheEvent::created("after", 1));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.key, "after");
        assert_eq!(event.kind, CacheEventKind::Created);
        assert_eq!(event.value, Some(1));
    }

    #[tokio::test]
    async fn filters_compose() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus
            .subscribe()
            .where_type(CacheEventKind::Removed)
            .where_key_prefix("users::");

        bus.emit(CacheEvent::created("users::1", 1));
        bus.emit(CacheEvent::removed("sessions::1", 2));
        bus.emit(CacheEvent::removed("users::2", 3));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.key, "users::2");
    }

    #[tokio::test]
    async fn additions_cover_created_and_updated() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus.subscribe().additions();

        bus.emit(CacheEvent::evicted("a", 1));
        bus.emit(CacheEvent::updated("b", 2, 1));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, CacheEventKind::Updated);
        assert_eq!(event.previous, Some(1));
    }

    #[tokio::test]
    async fn recv_returns_none_after_bus_drop() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn cleared_events_have_empty_keys() {
        let event: CacheEvent<u32> = CacheEvent::cleared();
        assert_eq!(event.kind, CacheEventKind::Cleared);
        assert!(event.key.is_empty());
        assert!(event.value.is_none());
    }
}
