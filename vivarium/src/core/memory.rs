//! Capacity-bounded observation log kept by every agent.

use std::collections::VecDeque;
use std::sync::RwLock;

/// Append-only log of textual observations with FIFO eviction.
///
/// Holds at most `capacity` entries; storing one more evicts the single
/// oldest entry. Readers only ever see copies, never the live backing
/// sequence, so a snapshot taken during concurrent stores is always a
/// consistent view.
#[derive(Debug)]
pub struct MemoryLog {
    entries: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl MemoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an observation, evicting the oldest entry when full.
    pub fn store(&self, observation: impl Into<String>) {
        let mut entries = self.entries.write().expect("memory lock poisoned");
        entries.push_back(observation.into());
        if entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Copy out all entries, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        let entries = self.entries.read().expect("memory lock poisoned");
        entries.iter().cloned().collect()
    }

    /// Copy out the most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let entries = self.entries.read().expect("memory lock poisoned");
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("memory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_in_insertion_order() {
        let log = MemoryLog::new(10);
        log.store("first");
        log.store("second");
        assert_eq!(log.snapshot(), vec!["first", "second"]);
    }

    /// Inserting capacity + k entries leaves exactly capacity entries, and
    /// they are the most recent ones in insertion order.
    #[test]
    fn evicts_single_oldest_entry_when_over_capacity() {
        let log = MemoryLog::new(3);
        for i in 0..5 {
            log.store(format!("entry {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot(), vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn recent_returns_last_n_oldest_first() {
        let log = MemoryLog::new(10);
        for i in 0..4 {
            log.store(format!("entry {i}"));
        }
        assert_eq!(log.recent(2), vec!["entry 2", "entry 3"]);
        assert_eq!(log.recent(100).len(), 4);
        assert!(MemoryLog::new(5).recent(3).is_empty());
    }

    #[test]
    fn snapshot_is_independent_of_later_stores() {
        let log = MemoryLog::new(5);
        log.store("a");
        let snap = log.snapshot();
        log.store("b");
        assert_eq!(snap, vec!["a"]);
    }

    #[test]
    fn concurrent_stores_never_exceed_capacity() {
        use std::sync::Arc;

        let log = Arc::new(MemoryLog::new(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.store(format!("{t}-{i}"));
                        let snap = log.snapshot();
                        assert!(snap.len() <= 8);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        assert_eq!(log.len(), 8);
    }
}
