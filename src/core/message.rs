use serde::{Deserialize, Serialize};

/// A message as accepted by the ingestion queue, before a key is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub timestamp: i64,
    pub content: String,
}

impl NewMessage {
    pub fn new(timestamp: i64, content: impl Into<String>) -> Self {
        Self {
            timestamp,
            content: content.into(),
        }
    }

    pub(crate) fn into_message(self, pk: u64) -> Message {
        Message {
            pk,
            timestamp: self.timestamp,
            content: self.content,
        }
    }
}

/// A visible message. `pk` is assigned by the cache and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub pk: u64,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "msg")]
    pub content: String,
}
