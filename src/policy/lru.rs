//! Least Recently Used eviction bookkeeping.
//!
//! Keys live in a slot arena threaded by an intrusive doubly linked list in
//! strict access order:
//!
//! ```text
//!   head ──► [cold] ◄──► [ .. ] ◄──► [hot] ◄── tail
//!            (victim)                (last touched)
//! ```
//!
//! `on_access` and `on_add` unlink the key and re-link it at the tail, so
//! the head is always the least recently used key. All operations are
//! amortized O(1).

use rustc_hash::FxHashMap;

use super::EvictionPolicy;

#[derive(Debug)]
struct Slot {
    key: Option<String>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Access-ordered bookkeeping; the eviction candidate is the coldest key.
#[derive(Debug, Default)]
pub struct LruPolicy {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: FxHashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruPolicy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        LruPolicy::default()
    }

    fn allocate(&mut self, key: String) -> usize {
        let slot = Slot {
            key: Some(key),
            prev: None,
            next: None,
        };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = slot;
            idx
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        }
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        match prev {
            Some(prev_idx) => self.slots[prev_idx].next = next,
            None => self.head = next,
        }
        match next {
            Some(next_idx) => self.slots[next_idx].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_tail(&mut self, idx: usize) {
        self.slots[idx].prev = self.tail;
        self.slots[idx].next = None;
        match self.tail {
            Some(tail_idx) => self.slots[tail_idx].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Key currently at the cold end, without nominating it for eviction.
    pub fn coldest(&self) -> Option<&str> {
        self.head
            .and_then(|idx| self.slots[idx].key.as_deref())
    }
}

impl EvictionPolicy for LruPolicy {
    fn on_access(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            self.unlink(idx);
            self.push_tail(idx);
        }
    }

    fn on_add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&idx) => {
                self.unlink(idx);
                self.push_tail(idx);
            }
            None => {
                let idx = self.allocate(key.to_string());
                self.index.insert(key.to_string(), idx);
                self.push_tail(idx);
            }
        }
    }

    fn on_remove(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.unlink(idx);
            self.slots[idx].key = None;
            self.free.push(idx);
        }
    }

    fn eviction_candidate(&mut self) -> Option<String> {
        self.coldest().map(str::to_string)
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
