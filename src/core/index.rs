use std::collections::HashMap;

use parking_lot::RwLock;

/// Groups pks by timestamp. Buckets keep insertion order, which is arrival
/// order because a single consumer feeds the index.
#[derive(Debug, Default)]
pub struct TimestampIndex {
    buckets: RwLock<HashMap<i64, Vec<u64>>>,
}

impl TimestampIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `pk` to the bucket for `timestamp`. Returns true if the bucket
    /// did not exist before.
    pub fn insert(&self, timestamp: i64, pk: u64) -> bool {
        let mut buckets = self.buckets.write();
        match buckets.get_mut(&timestamp) {
            Some(bucket) => {
                bucket.push(pk);
                false
            }
            None => {
                buckets.insert(timestamp, vec![pk]);
                true
            }
        }
    }

    pub fn lookup(&self, timestamp: i64) -> Option<Vec<u64>> {
        self.buckets.read().get(&timestamp).cloned()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.buckets.read().contains_key(&timestamp)
    }

    /// Number of distinct timestamps.
    pub fn distinct(&self) -> usize {
        self.buckets.read().len()
    }

    pub(crate) fn timestamps(&self) -> Vec<i64> {
        self.buckets.read().keys().copied().collect()
    }
}
