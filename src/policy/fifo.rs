//! First In, First Out eviction bookkeeping.
//!
//! An insertion queue paired with a membership set. Removals only touch the
//! set, leaving stale entries in the queue; the candidate lookup pops those
//! lazily until it finds a key still in the set. Re-adding a live key does
//! not push it to the back, so a key's age is fixed by its first
//! insertion.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::EvictionPolicy;

/// Insertion-ordered bookkeeping; accesses never change the victim order.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    queue: VecDeque<String>,
    members: FxHashSet<String>,
}

impl FifoPolicy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        FifoPolicy::default()
    }

    /// Queue slots currently occupied, stale entries included. Exposed for
    /// tests exercising lazy compaction.
    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl EvictionPolicy for FifoPolicy {
    fn on_access(&mut self, _key: &str) {}

    fn on_add(&mut self, key: &str) {
        if self.members.insert(key.to_string()) {
            self.queue.push_back(key.to_string());
        }
    }

    fn on_remove(&mut self, key: &str) {
        self.members.remove(key);
    }

    fn eviction_candidate(&mut self) -> Option<String> {
        while let Some(front) = self.queue.front() {
            if self.members.contains(front) {
                return Some(front.clone());
            }
            self.queue.pop_front();
        }
        None
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.members.clear();
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// Checks that a policy's candidate stream drains a workload in the order
/// `expected` lists. Shared by the variant tests below.
#[cfg(test)]
fn drain_order(policy: &mut impl EvictionPolicy) -> Vec<String> {
    let mut order = Vec::new();
    while let Some(victim) = policy.eviction_candidate() {
        policy.on_remove(&victim);
        order.push(victim);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_is_oldest_insertion() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_add("c");
        assert_eq!(policy.eviction_candidate().as_deref(), Some("a"));
    }

    #[test]
    fn access_does_not_change_order() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_access("a");
        policy.on_access("a");
        assert_eq!(policy.eviction_candidate().as_deref(), Some("a"));
    }

    #[test]
    fn re_adding_a_live_key_keeps_its_age() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_add("a");
        assert_eq!(policy.len(), 2);
        assert_eq!(drain_order(&mut policy), ["a", "b"]);
    }

    #[test]
    fn candidate_skips_and_pops_stale_queue_entries() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_add("c");

        policy.on_remove("a");
        policy.on_remove("b");
        assert_eq!(policy.queue_len(), 3);

        assert_eq!(policy.eviction_candidate().as_deref(), Some("c"));
        // The two stale entries were popped during the scan.
        assert_eq!(policy.queue_len(), 1);
    }

    #[test]
    fn removed_then_re_added_key_moves_to_the_back() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_remove("a");
        policy.on_add("a");
        assert_eq!(drain_order(&mut policy), ["b", "a"]);
    }

    #[test]
    fn empty_policy_has_no_candidate() {
        let mut policy = FifoPolicy::new();
        assert_eq!(policy.eviction_candidate(), None);
        policy.on_add("a");
        policy.on_remove("a");
        assert_eq!(policy.eviction_candidate(), None);
        assert!(policy.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut policy = FifoPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.clear();
        assert!(policy.is_empty());
        assert_eq!(policy.queue_len(), 0);
    }
}
