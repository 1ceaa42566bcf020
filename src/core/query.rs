use std::ops::ControlFlow;

use crate::core::cache::CacheState;
use crate::core::message::Message;

/// Single pass over the ordered timestamps, newest first. A bucket that does
/// not fit the remaining budget is cut to its oldest entries and the walk
/// stops. Running out of timestamps ends the walk with whatever was found.
pub(crate) fn get_last(state: &CacheState, count: usize) -> Vec<Message> {
    if count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(count.min(state.store.len()));
    state.order.walk_desc(&mut |timestamp| {
        // The order learns a timestamp just before its first pk is indexed.
        let Some(pks) = state.index.lookup(timestamp) else {
            return ControlFlow::Continue(());
        };
        let take = pks.len().min(count - out.len());
        state.store.get_many(&pks[..take], &mut out);
        if out.len() >= count {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    out
}

pub(crate) fn get_by_timestamp(state: &CacheState, timestamp: i64) -> Vec<Message> {
    let Some(pks) = state.index.lookup(timestamp) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(pks.len());
    state.store.get_many(&pks, &mut out);
    out
}
