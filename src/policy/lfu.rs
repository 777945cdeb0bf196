//! Least Frequently Used eviction bookkeeping.
//!
//! Structure mirrors the classic O(1) LFU design: keys live in a slot
//! arena, each frequency has its own intrusive list of slots in recency
//! order, and the populated frequencies are kept in an ordered map so the
//! minimum can be recomputed when a bucket empties.
//!
//! ```text
//!   freq 1: front ──► [d] ◄──► [c] ◄── back   ◄─ victim end (oldest)
//!   freq 3: front ──► [a] ◄── back
//!   min_freq = 1
//! ```
//!
//! `on_access` advances a key one bucket. The eviction candidate is the
//! back of the minimum bucket, which ties break toward the key that
//! entered the bucket earliest.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use super::EvictionPolicy;

#[derive(Debug)]
struct Slot {
    key: Option<String>,
    freq: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Default)]
struct BucketList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl BucketList {
    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Frequency-ordered bookkeeping; the eviction candidate is the oldest key
/// at the lowest access count.
#[derive(Debug, Default)]
pub struct LfuPolicy {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: FxHashMap<String, usize>,
    buckets: BTreeMap<u64, BucketList>,
    min_freq: u64,
}

impl LfuPolicy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        LfuPolicy::default()
    }

    /// Current access count for a tracked key.
    pub fn frequency(&self, key: &str) -> Option<u64> {
        self.index.get(key).map(|&idx| self.slots[idx].freq)
    }

    fn allocate(&mut self, key: String, freq: u64) -> usize {
        let slot = Slot {
            key: Some(key),
            freq,
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

    fn list_push_front(slots: &mut [Slot], list: &mut BucketList, idx: usize) {
        let old_head = list.head;
        slots[idx].prev = None;
        slots[idx].next = old_head;
        match old_head {
            Some(head_idx) => slots[head_idx].prev = Some(idx),
            None => list.tail = Some(idx),
        }
        list.head = Some(idx);
        list.len += 1;
    }

    fn list_remove(slots: &mut [Slot], list: &mut BucketList, idx: usize) {
        let prev = slots[idx].prev;
        let next = slots[idx].next;
        match prev {
            Some(prev_idx) => slots[prev_idx].next = next,
            None => list.head = next,
        }
        match next {
            Some(next_idx) => slots[next_idx].prev = prev,
            None => list.tail = prev,
        }
        slots[idx].prev = None;
        slots[idx].next = None;
        list.len = list.len.saturating_sub(1);
    }

    fn detach_from_bucket(&mut self, idx: usize) {
        let freq = self.slots[idx].freq;
        if let Some(bucket) = self.buckets.get_mut(&freq) {
            Self::list_remove(&mut self.slots, bucket, idx);
            if bucket.is_empty() {
                self.buckets.remove(&freq);
            }
        }
    }

    fn attach_to_bucket(&mut self, idx: usize, freq: u64) {
        self.slots[idx].freq = freq;
        let bucket = self.buckets.entry(freq).or_default();
        Self::list_push_front(&mut self.slots, bucket, idx);
    }

    fn refresh_min_freq(&mut self) {
        self.min_freq = self.buckets.keys().next().copied().unwrap_or(0);
    }
}

impl EvictionPolicy for LfuPolicy {
    fn on_access(&mut self, key: &str) {
        let Some(&idx) = self.index.get(key) else {
            return;
        };
        let next_freq = self.slots[idx].freq.saturating_add(1);
        self.detach_from_bucket(idx);
        self.attach_to_bucket(idx, next_freq);
        self.refresh_min_freq();
    }

    fn on_add(&mut self, key: &str) {
        match self.index.get(key) {
            // Overwrite restarts the key at frequency 1.
            Some(&idx) => {
                self.detach_from_bucket(idx);
                self.attach_to_bucket(idx, 1);
            }
            None => {
                let idx = self.allocate(key.to_string(), 1);
                self.index.insert(key.to_string(), idx);
                self.attach_to_bucket(idx, 1);
            }
        }
        self.min_freq = 1;
    }

    fn on_remove(&mut self, key: &str) {
        if let Some(idx) = self.index.remove(key) {
            self.detach_from_bucket(idx);
            self.slots[idx].key = None;
            self.free.push(idx);
            self.refresh_min_freq();
        }
    }

    fn eviction_candidate(&mut self) -> Option<String> {
        let bucket = self.buckets.get(&self.min_freq)?;
        let idx = bucket.tail?;
        self.slots[idx].key.clone()
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.buckets.clear();
        self.min_freq = 0;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
