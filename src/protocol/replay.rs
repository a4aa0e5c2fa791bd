//! Handshake replay detection.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Bounded set of seen handshake nonces.
///
/// Eviction is deliberately coarse: when the set is full the whole thing is
/// cleared before the new entry is inserted. Memory stays O(capacity) with
/// no background task; capacity should be sized so the timestamp drift
/// window expires entries before the set fills at peak handshake rate.
pub struct NonceTracker {
    seen: Mutex<HashSet<u64>>,
    capacity: usize,
}

impl NonceTracker {
    /// Create a tracker that remembers up to `capacity` nonces.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a nonce, returning true if it has not been seen before.
    pub fn check(&self, nonce: u64) -> bool {
        let mut seen = self.seen.lock();

        if seen.contains(&nonce) {
            return false;
        }

        if seen.len() >= self.capacity {
            seen.clear();
        }
        seen.insert(nonce);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_nonces_accepted() {
        let tracker = NonceTracker::new(100);
        assert!(tracker.check(1));
        assert!(tracker.check(2));
        assert!(tracker.check(3));
    }

    #[test]
    fn test_replay_rejected() {
        let tracker = NonceTracker::new(100);
        assert!(tracker.check(42));
        assert!(!tracker.check(42));
        assert!(!tracker.check(42));
    }

    #[test]
    fn test_overflow_clears_set() {
        let tracker = NonceTracker::new(3);

        assert!(tracker.check(1));
        assert!(tracker.check(2));
        assert!(tracker.check(3));

        // The 4th insertion evicts everything first
        assert!(tracker.check(4));

        // Previously-seen nonces are acceptable again
        assert!(tracker.check(1));
        assert!(tracker.check(2));

        // But the post-eviction entries are tracked normally
        assert!(!tracker.check(4));
    }

    #[test]
    fn test_concurrent_checks() {
        let tracker = Arc::new(NonceTracker::new(10_000));
        let mut handles = Vec::new();

        for i in 0..100u64 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                assert!(tracker.check(i));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every nonce was inserted exactly once
        for i in 0..100u64 {
            assert!(!tracker.check(i));
        }
    }
}
