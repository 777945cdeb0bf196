//! Single-flight coordination for per-key asynchronous work.
//!
//! One table serves both consumers, which differ only in what a follower
//! does with its ticket: the loading cache awaits the leader's result,
//! while the stale-while-revalidate path treats "someone is already
//! flying" as a reason not to spawn a second revalidation.
//!
//! Joining is atomic with the membership check: the first task to join a
//! key becomes the leader and receives a guard; everyone else receives a
//! waiter on the leader's result channel. A leader that is dropped without
//! completing (cancellation) releases the slot and closes the channel, so
//! waiters wake up empty-handed and re-race.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;

use crate::error::CacheError;

#[derive(Debug, Clone)]
enum FlightState<V> {
    Pending,
    Done(Result<V, CacheError>),
}

#[derive(Debug, Default)]
struct Table<V> {
    inflight: Mutex<FxHashMap<String, watch::Receiver<FlightState<V>>>>,
}

/// Cheap-to-clone handle to a per-key in-flight table.
#[derive(Debug)]
pub(crate) struct FlightGroup<V> {
    table: Arc<Table<V>>,
}

impl<V> Clone for FlightGroup<V> {
    fn clone(&self) -> Self {
        FlightGroup {
            table: Arc::clone(&self.table),
        }
    }
}

/// Outcome of [`FlightGroup::join`].
pub(crate) enum Flight<V> {
    /// This task owns the load for the key until the guard completes or
    /// drops.
    Leader(FlightGuard<V>),
    /// Another task owns the load; the waiter resolves with its result.
    Follower(FlightWaiter<V>),
}

impl<V: Clone> FlightGroup<V> {
    pub(crate) fn new() -> Self {
        FlightGroup {
            table: Arc::new(Table {
                inflight: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Joins the flight for `key`, atomically becoming leader when no
    /// flight is active.
    pub(crate) fn join(&self, key: &str) -> Flight<V> {
        let mut inflight = self.table.inflight.lock();
        if let Some(rx) = inflight.get(key) {
            return Flight::Follower(FlightWaiter { rx: rx.clone() });
        }
        let (tx, rx) = watch::channel(FlightState::Pending);
        inflight.insert(key.to_string(), rx);
        Flight::Leader(FlightGuard {
            group: self.clone(),
            key: key.to_string(),
            tx,
            completed: false,
        })
    }

    /// `true` while a leader is active for `key`.
    pub(crate) fn is_in_flight(&self, key: &str) -> bool {
        self.table.inflight.lock().contains_key(key)
    }

    /// Drops every slot; pending waiters wake and re-race.
    pub(crate) fn clear(&self) {
        self.table.inflight.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.table.inflight.lock().len()
    }
}

impl<V> FlightGroup<V> {
    fn release(&self, key: &str) {
        self.table.inflight.lock().remove(key);
    }
}

/// Leader-side handle; completing it publishes the result to all waiters
/// and releases the slot.
pub(crate) struct FlightGuard<V> {
    group: FlightGroup<V>,
    key: String,
    tx: watch::Sender<FlightState<V>>,
    completed: bool,
}

impl<V: Clone> FlightGuard<V> {
    pub(crate) fn complete(mut self, result: Result<V, CacheError>) {
        self.completed = true;
        let _ = self.tx.send(FlightState::Done(result));
        self.group.release(&self.key);
    }
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        if !self.completed {
            self.group.release(&self.key);
        }
    }
}

/// Follower-side handle on a leader's result channel.
pub(crate) struct FlightWaiter<V> {
    rx: watch::Receiver<FlightState<V>>,
}

impl<V: Clone> FlightWaiter<V> {
    /// Resolves with the leader's result, or `None` when the leader was
    /// cancelled before completing.
    pub(crate) async fn wait(mut self) -> Option<Result<V, CacheError>> {
        loop {
            {
                let state = self.rx.borrow_and_update();
                if let FlightState::Done(result) = &*state {
                    return Some(result.clone());
                }
            }
            if self.rx.changed().await.is_err() {
                // Sender gone; the final value may still be a result.
                let state = self.rx.borrow();
                if let FlightState::Done(result) = &*state {
                    return Some(result.clone());
                }
                return None;
            }
        }
    }
}
