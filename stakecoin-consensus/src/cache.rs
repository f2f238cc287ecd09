//! A bounded cache of block header facts.
//!
//! The median-timestamp rule and the stake modifier both walk ancestor
//! chains, but only need each ancestor's parent link and timestamp. Caching
//! those two fields avoids decoding full processed blocks (diffs included)
//! on every walk. Entries are evicted in insertion order once the cache is
//! full; the consensus set sizes it to several times the median-timestamp
//! window.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use stakecoin_chain::{BlockId, Timestamp};

pub struct HeaderCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<BlockId, (BlockId, Timestamp)>,
    order: VecDeque<BlockId>,
    capacity: usize,
}

impl HeaderCache {
    pub fn new(capacity: usize) -> HeaderCache {
        assert!(capacity > 0, "header cache capacity must be positive");
        HeaderCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// The cached `(parent id, timestamp)` of a block, if present.
    pub fn get(&self, id: &BlockId) -> Option<(BlockId, Timestamp)> {
        self.inner.lock().entries.get(id).copied()
    }

    pub fn insert(&self, id: BlockId, parent: BlockId, timestamp: Timestamp) {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&id) {
            return;
        }
        if inner.entries.len() == inner.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        inner.entries.insert(id, (parent, timestamp));
        inner.order.push_back(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> BlockId {
        BlockId([byte; 32])
    }

    #[test]
    fn evicts_in_insertion_order() {
        let cache = HeaderCache::new(2);
        cache.insert(id(1), id(0), Timestamp(1));
        cache.insert(id(2), id(1), Timestamp(2));
        cache.insert(id(3), id(2), Timestamp(3));
        assert_eq!(cache.get(&id(1)), None);
        assert_eq!(cache.get(&id(2)), Some((id(1), Timestamp(2))));
        assert_eq!(cache.get(&id(3)), Some((id(2), Timestamp(3))));
    }
}
