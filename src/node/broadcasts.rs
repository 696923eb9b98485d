//! Tracks the route request floods already handled, so each one is processed once.

use std::collections::HashMap;

/// Default number of origins remembered by the tracker.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    broadcast_id: u32,
    // Value of the update counter when this entry last changed.
    updated: u64,
}

/// Highest broadcast id accepted from each origin.
#[derive(Debug)]
pub struct BroadcastTracker {
    cache: HashMap<String, CacheEntry>,
    capacity: usize,
    updates: u64,
}

impl Default for BroadcastTracker {
    fn default() -> Self {
        BroadcastTracker::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastTracker {
    /// Creates a tracker that remembers up to `capacity` origins.
    pub fn new(capacity: usize) -> BroadcastTracker {
        BroadcastTracker {
            cache: HashMap::new(),
            capacity: capacity.max(1),
            updates: 0,
        }
    }

    /// Accepts and records the flood if nothing was seen from `origin` yet, or if
    /// `broadcast_id` is newer than the one on record. Rejected floods leave the tracker untouched.
    pub fn should_process(&mut self, origin: &str, broadcast_id: u32) -> bool {
        if let Some(entry) = self.cache.get(origin) {
            if entry.broadcast_id >= broadcast_id {
                return false;
            }
        } else if self.cache.len() >= self.capacity {
            self.evict_oldest();
        }

        self.updates += 1;
        self.cache.insert(
            origin.to_string(),
            CacheEntry {
                broadcast_id,
                updated: self.updates,
            },
        );
        true
    }

    /// Last broadcast id accepted from `origin`.
    pub fn last_seen(&self, origin: &str) -> Option<u32> {
        self.cache.get(origin).map(|e| e.broadcast_id)
    }

    /// Number of origins currently remembered.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when no flood has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|(_, e)| e.updated)
            .map(|(k, _)| k.clone());
        if let Some(origin) = oldest {
            self.cache.remove(&origin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_rejected() {
        let mut tracker = BroadcastTracker::default();
        let results: Vec<bool> = [1, 1, 2, 2, 3]
            .iter()
            .map(|id| tracker.should_process("01", *id))
            .collect();

        assert_eq!(results, vec![true, false, true, false, true]);
        assert_eq!(tracker.last_seen("01"), Some(3));
    }

    #[test]
    fn test_older_ids_are_rejected() {
        let mut tracker = BroadcastTracker::default();
        assert!(tracker.should_process("01", 5));
        assert!(!tracker.should_process("01", 4));
        assert_eq!(tracker.last_seen("01"), Some(5));
    }

    #[test]
    fn test_origins_are_independent() {
        let mut tracker = BroadcastTracker::default();
        assert!(tracker.should_process("01", 1));
        assert!(tracker.should_process("02", 1));
        assert!(!tracker.should_process("01", 1));
        assert!(!tracker.should_process("02", 1));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_least_recently_updated_origin_is_evicted() {
        let mut tracker = BroadcastTracker::new(2);
        assert!(tracker.should_process("01", 1));
        assert!(tracker.should_process("02", 1));
        assert!(tracker.should_process("01", 2));

        //"02" is now the stalest entry
        assert!(tracker.should_process("03", 1));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.last_seen("02").is_none());
        assert_eq!(tracker.last_seen("01"), Some(2));

        //Once evicted, an old flood is accepted again
        assert!(tracker.should_process("02", 1));
    }
}
