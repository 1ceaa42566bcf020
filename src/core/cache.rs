use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::core::allocator::PkAllocator;
use crate::core::index::TimestampIndex;
use crate::core::ingest::{self, Ingestor, ShutdownReport};
use crate::core::message::{Message, NewMessage};
use crate::core::order::TimestampOrder;
use crate::core::query;
use crate::core::store::Store;
use crate::Result;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) accepted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) dropped: AtomicU64,
    /// Messages the consumer applied or dropped.
    pub(crate) processed: AtomicU64,
}

/// Everything the consumer writes and the readers read.
pub(crate) struct CacheState {
    pub(crate) allocator: PkAllocator,
    pub(crate) store: Store,
    pub(crate) index: TimestampIndex,
    pub(crate) order: Box<dyn TimestampOrder>,
    pub(crate) counters: Counters,
    /// Producers currently inside `enqueue`.
    pub(crate) producers: AtomicUsize,
    closed: AtomicBool,
}

impl CacheState {
    pub(crate) fn new(order: Box<dyn TimestampOrder>) -> Self {
        Self {
            allocator: PkAllocator::new(),
            store: Store::new(),
            index: TimestampIndex::new(),
            order,
            counters: Counters::default(),
            producers: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Assigns a pk and makes the message visible.
    ///
    /// Only the ingest consumer calls this. Writes go store, then order, then
    /// index, one lock at a time. Readers reach messages through the index,
    /// so a pk they can see always resolves in the store.
    pub(crate) fn apply(&self, message: NewMessage) -> u64 {
        let pk = self.allocator.next();
        let timestamp = message.timestamp;
        self.store.put(message.into_message(pk));
        if !self.index.contains(timestamp) {
            self.order.insert(timestamp);
        }
        self.index.insert(timestamp, pk);
        pk
    }
}

/// Point-in-time counters for a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Messages accepted by `enqueue`.
    pub accepted: u64,
    /// Messages rejected with `QueueFull`.
    pub rejected: u64,
    /// Messages discarded on shutdown.
    pub dropped: u64,
    /// Accepted messages not yet processed by the consumer.
    pub queued: u64,
    /// Next pk the allocator will hand out.
    pub next_pk: u64,
    /// Visible messages.
    pub stored: usize,
    pub distinct_timestamps: usize,
    /// Bulk re-sorts of the ordered timestamp list.
    pub order_refreshes: u64,
}

/// In-memory, append-only message cache.
///
/// Owns the ingest consumer thread; dropping the cache shuts it down using
/// the configured [`crate::DrainPolicy`].
pub struct MessageCache {
    state: Arc<CacheState>,
    ingestor: Ingestor,
    consumer: Mutex<Option<std::thread::JoinHandle<ShutdownReport>>>,
}

impl MessageCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(CacheState::new(config.ordering.build()));
        let consumer = ingest::spawn(
            Arc::clone(&state),
            config.queue_capacity,
            config.backpressure,
            config.drain,
            config.consumer_core,
        )?;
        Ok(Self {
            state,
            ingestor: consumer.ingestor,
            consumer: Mutex::new(Some(consumer.handle)),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(CacheConfig::default())
    }

    /// Producer handle that can be moved to other threads.
    pub fn ingestor(&self) -> Ingestor {
        self.ingestor.clone()
    }

    /// See [`Ingestor::enqueue`].
    pub fn enqueue(&self, message: NewMessage) -> Result<()> {
        self.ingestor.enqueue(message)
    }

    /// Up to `count` messages, newest timestamp first, arrival order within a
    /// timestamp.
    pub fn get_last(&self, count: usize) -> Vec<Message> {
        query::get_last(&self.state, count)
    }

    /// Messages with exactly `timestamp`, in arrival order.
    pub fn get_by_timestamp(&self, timestamp: i64) -> Vec<Message> {
        query::get_by_timestamp(&self.state, timestamp)
    }

    pub fn get(&self, pk: u64) -> Option<Message> {
        self.state.store.get(pk)
    }

    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until every message accepted before this call is visible.
    /// Returns false if `timeout` elapsed first. See [`Ingestor::sync`].
    pub fn sync(&self, timeout: Duration) -> bool {
        self.ingestor.sync(timeout)
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.state.counters;
        let accepted = counters.accepted.load(Ordering::SeqCst);
        CacheStats {
            accepted,
            rejected: counters.rejected.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            queued: accepted.saturating_sub(counters.processed.load(Ordering::SeqCst)),
            next_pk: self.state.allocator.peek(),
            stored: self.state.store.len(),
            distinct_timestamps: self.state.index.distinct(),
            order_refreshes: self.state.order.refreshes(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Stops the consumer. Later `enqueue` calls fail with `Closed`.
    /// Calling it again returns an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        let Some(handle) = self.consumer.lock().take() else {
            return ShutdownReport::default();
        };
        self.state.close();
        self.ingestor.stop();
        match handle.join() {
            Ok(report) => {
                info!(
                    "message cache closed: {} stored, {} flushed, {} dropped",
                    self.state.store.len(),
                    report.flushed,
                    report.dropped
                );
                report
            }
            Err(_) => {
                error!("ingest consumer panicked");
                ShutdownReport::default()
            }
        }
    }
}

impl Drop for MessageCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::OrderingStrategy;

    #[test]
    fn apply_assigns_sequential_pks() {
        let state = CacheState::new(OrderingStrategy::LazySort.build());
        assert_eq!(state.apply(NewMessage::new(5, "a")), 0);
        assert_eq!(state.apply(NewMessage::new(3, "b")), 1);
        assert_eq!(state.apply(NewMessage::new(5, "c")), 2);

        assert_eq!(state.index.lookup(5), Some(vec![0, 2]));
        assert_eq!(state.order.to_vec_desc(), vec![5, 3]);
        assert_eq!(state.store.get(1).map(|m| m.content), Some("b".to_string()));
    }

    #[test]
    fn order_matches_index_keys() {
        let state = CacheState::new(OrderingStrategy::LazySort.build());
        for ts in [9, 1, 9, 4, 1, 7] {
            state.apply(NewMessage::new(ts, "x"));
        }
        let mut keys = state.index.timestamps();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(state.order.to_vec_desc(), keys);
    }

    #[test]
    fn stats_track_ingest() {
        let cache = MessageCache::new(CacheConfig::default()).unwrap();
        for ts in [1, 2, 2] {
            cache.enqueue(NewMessage::new(ts, "x")).unwrap();
        }
        assert!(cache.sync(Duration::from_secs(5)));
        cache.get_last(10);

        let stats = cache.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.next_pk, 3);
        assert_eq!(stats.stored, 3);
        assert_eq!(stats.distinct_timestamps, 2);
        assert_eq!(stats.order_refreshes, 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let cache = MessageCache::with_defaults().unwrap();
        cache.enqueue(NewMessage::new(1, "x")).unwrap();
        let report = cache.shutdown();
        assert_eq!(report.dropped, 0);
        assert!(cache.is_closed());
        assert_eq!(cache.shutdown(), ShutdownReport::default());
        assert_eq!(cache.len(), 1);
    }
}
