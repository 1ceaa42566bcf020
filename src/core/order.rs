//! Distinct timestamps in descending order, used to drive recency scans.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

/// An ordered view over the distinct timestamps present in the index.
///
/// `insert` is called once per distinct timestamp, by the ingest consumer,
/// before the first pk for that timestamp reaches the index.
pub trait TimestampOrder: Send + Sync + 'static {
    fn insert(&self, timestamp: i64);

    /// Visits timestamps from highest to lowest until `visit` breaks or the
    /// timestamps are exhausted. Each timestamp is visited at most once.
    fn walk_desc(&self, visit: &mut dyn FnMut(i64) -> ControlFlow<()>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bulk re-sorts performed so far.
    fn refreshes(&self) -> u64 {
        0
    }

    fn to_vec_desc(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.len());
        self.walk_desc(&mut |timestamp| {
            out.push(timestamp);
            ControlFlow::Continue(())
        });
        out
    }
}

/// Which [`TimestampOrder`] implementation a cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingStrategy {
    /// Append on insert, re-sort on the next read after a new timestamp.
    /// Cheap while distinct timestamps are few compared to messages.
    #[default]
    LazySort,
    /// Balanced tree maintained on insert; no bulk re-sort on reads.
    Tree,
}

impl OrderingStrategy {
    pub fn build(self) -> Box<dyn TimestampOrder> {
        match self {
            OrderingStrategy::LazySort => Box::new(LazySortedList::new()),
            OrderingStrategy::Tree => Box::new(TreeOrder::new()),
        }
    }
}

#[derive(Debug, Default)]
struct LazyState {
    timestamps: Vec<i64>,
    dirty: bool,
}

/// Vec of timestamps with a dirty flag. The flag only changes under the
/// write lock, so a reader holding the read lock with `dirty == false` sees
/// a fully sorted list.
#[derive(Debug, Default)]
pub struct LazySortedList {
    state: RwLock<LazyState>,
    refreshes: AtomicU64,
}

impl LazySortedList {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self) -> RwLockReadGuard<'_, LazyState> {
        let state = self.state.read();
        if !state.dirty {
            return state;
        }
        drop(state);

        let mut state = self.state.write();
        // Another reader may have refreshed while we waited for the lock.
        if state.dirty {
            state.timestamps.sort_unstable_by(|a, b| b.cmp(a));
            state.dirty = false;
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        }
        RwLockWriteGuard::downgrade(state)
    }
}

impl TimestampOrder for LazySortedList {
    fn insert(&self, timestamp: i64) {
        let mut state = self.state.write();
        state.timestamps.push(timestamp);
        state.dirty = true;
    }

    fn walk_desc(&self, visit: &mut dyn FnMut(i64) -> ControlFlow<()>) {
        let state = self.sorted();
        for &timestamp in &state.timestamps {
            if visit(timestamp).is_break() {
                return;
            }
        }
    }

    fn len(&self) -> usize {
        self.state.read().timestamps.len()
    }

    fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct TreeOrder {
    timestamps: RwLock<BTreeSet<i64>>,
}

impl TreeOrder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimestampOrder for TreeOrder {
    fn insert(&self, timestamp: i64) {
        self.timestamps.write().insert(timestamp);
    }

    fn walk_desc(&self, visit: &mut dyn FnMut(i64) -> ControlFlow<()>) {
        let timestamps = self.timestamps.read();
        for &timestamp in timestamps.iter().rev() {
            if visit(timestamp).is_break() {
                return;
            }
        }
    }

    fn len(&self) -> usize {
        self.timestamps.read().len()
    }
}
