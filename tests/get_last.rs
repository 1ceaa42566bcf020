use std::time::Duration;

use msgcache::{CacheConfig, Message, MessageCache, NewMessage, OrderingStrategy};

const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

fn cache_with(ordering: OrderingStrategy, timestamps: &[i64]) -> MessageCache {
    let cache = MessageCache::new(CacheConfig::default().with_ordering(ordering)).expect("cache");
    for (i, &ts) in timestamps.iter().enumerate() {
        cache
            .enqueue(NewMessage::new(ts, format!("msg-{i}")))
            .expect("enqueue");
    }
    assert!(cache.sync(SYNC_TIMEOUT), "ingest did not drain");
    cache
}

fn timestamps(messages: &[Message]) -> Vec<i64> {
    messages.iter().map(|m| m.timestamp).collect()
}

fn both_strategies() -> [OrderingStrategy; 2] {
    [OrderingStrategy::LazySort, OrderingStrategy::Tree]
}

#[test]
fn ties_keep_arrival_order() {
    for ordering in both_strategies() {
        let cache = cache_with(ordering, &[5, 3, 5, 1]);
        let last = cache.get_last(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0], Message { pk: 0, timestamp: 5, content: "msg-0".to_string() });
        assert_eq!(last[1], Message { pk: 2, timestamp: 5, content: "msg-2".to_string() });
    }
}

#[test]
fn empty_cache_lists_nothing() {
    for ordering in both_strategies() {
        let cache = cache_with(ordering, &[]);
        assert!(cache.get_last(10).is_empty());
        assert!(cache.is_empty());
    }
}

#[test]
fn increasing_timestamps_come_back_newest_first() {
    let input: Vec<i64> = (1..=20).collect();
    for ordering in both_strategies() {
        let cache = cache_with(ordering, &input);
        assert_eq!(timestamps(&cache.get_last(5)), vec![20, 19, 18, 17, 16]);
    }
}

#[test]
fn count_within_total_returns_exactly_count() {
    let input = [4, 9, 1, 9, 7, 4, 4, 2, 9, 0];
    for ordering in both_strategies() {
        let cache = cache_with(ordering, &input);
        for k in 1..=input.len() {
            let last = cache.get_last(k);
            assert_eq!(last.len(), k);
            for pair in last.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(a.timestamp > b.timestamp || (a.timestamp == b.timestamp && a.pk < b.pk));
            }
        }
    }
}

#[test]
fn count_beyond_total_returns_everything() {
    for ordering in both_strategies() {
        let cache = cache_with(ordering, &[3, 8, 3]);
        let all = cache.get_last(1_000_000);
        assert_eq!(timestamps(&all), vec![8, 3, 3]);
        assert_eq!(all.iter().map(|m| m.pk).collect::<Vec<_>>(), vec![1, 0, 2]);
    }
}

#[test]
fn repeated_reads_are_identical() {
    let cache = cache_with(OrderingStrategy::LazySort, &[6, 2, 6, 9, 2]);
    let first = cache.get_last(4);
    let second = cache.get_last(4);
    assert_eq!(first, second);
    assert_eq!(cache.stats().order_refreshes, 1);
}

#[test]
fn new_timestamps_after_a_read_are_picked_up() {
    let cache = cache_with(OrderingStrategy::LazySort, &[10, 20]);
    assert_eq!(timestamps(&cache.get_last(1)), vec![20]);

    cache.enqueue(NewMessage::new(30, "later")).expect("enqueue");
    cache.enqueue(NewMessage::new(15, "between")).expect("enqueue");
    assert!(cache.sync(SYNC_TIMEOUT));
    assert_eq!(timestamps(&cache.get_last(10)), vec![30, 20, 15, 10]);
}

#[test]
fn by_timestamp_exact_match_in_arrival_order() {
    let cache = cache_with(OrderingStrategy::LazySort, &[5, 3, 5, 1, 5]);
    let fives = cache.get_by_timestamp(5);
    assert_eq!(fives.iter().map(|m| m.pk).collect::<Vec<_>>(), vec![0, 2, 4]);
    assert!(fives.iter().all(|m| m.timestamp == 5));
    assert!(cache.get_by_timestamp(4).is_empty());
    assert_eq!(cache.get(3).map(|m| m.timestamp), Some(1));
}

#[test]
fn negative_timestamps_sort_below_positive() {
    let cache = cache_with(OrderingStrategy::Tree, &[-5, 0, 7, -1]);
    assert_eq!(timestamps(&cache.get_last(10)), vec![7, 0, -1, -5]);
}
