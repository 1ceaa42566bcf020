use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out primary keys `0, 1, 2, ...`.
///
/// `next` is a single atomic fetch-add, so concurrent callers never observe
/// the same value and the values follow the order in which the calls take
/// effect.
#[derive(Debug, Default)]
pub struct PkAllocator {
    next: AtomicU64,
}

impl PkAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Value the next call to [`PkAllocator::next`] would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}
