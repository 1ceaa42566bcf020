use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::message::Message;

/// Authoritative pk -> message map.
///
/// One lock covers the whole map. Writers for different keys still serialize,
/// which bounds ingest throughput but not correctness.
#[derive(Debug, Default)]
pub struct Store {
    messages: RwLock<HashMap<u64, Message>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn put(&self, message: Message) {
        let mut messages = self.messages.write();
        let previous = messages.insert(message.pk, message);
        debug_assert!(previous.is_none(), "pk reused");
    }

    pub fn get(&self, pk: u64) -> Option<Message> {
        self.messages.read().get(&pk).cloned()
    }

    /// Resolves `pks` in order under a single read lock. Unknown pks are skipped.
    pub fn get_many(&self, pks: &[u64], out: &mut Vec<Message>) {
        let messages = self.messages.read();
        out.extend(pks.iter().filter_map(|pk| messages.get(pk).cloned()));
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(pk: u64, timestamp: i64) -> Message {
        Message {
            pk,
            timestamp,
            content: format!("m{pk}"),
        }
    }

    #[test]
    fn put_then_get() {
        let store = Store::new();
        assert!(store.is_empty());
        store.put(message(0, 10));
        store.put(message(1, 5));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).map(|m| m.timestamp), Some(5));
        assert!(store.get(2).is_none());
    }

    #[test]
    fn get_many_preserves_requested_order() {
        let store = Store::with_capacity(4);
        for pk in 0..4 {
            store.put(message(pk, pk as i64));
        }

        let mut out = Vec::new();
        store.get_many(&[3, 1, 9, 0], &mut out);
        let pks: Vec<u64> = out.iter().map(|m| m.pk).collect();
        assert_eq!(pks, vec![3, 1, 0]);
    }
}
