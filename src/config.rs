//! Cache configuration.
//!
//! Defines queue sizing, the full-queue policy, the timestamp ordering
//! strategy and what happens to queued messages on shutdown. Configurations
//! can be loaded from JSON; missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::order::OrderingStrategy;
use crate::{Error, Result};

const DEFAULT_QUEUE_CAPACITY: usize = 100_000;
const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 50;
const BACKPRESSURE_POLL_US: u64 = 100;

/// What `enqueue` does when the ingestion queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Reject immediately with [`Error::QueueFull`].
    FailFast,
    /// Retry every `poll_interval` until `timeout` elapses, then reject.
    /// `timeout: None` waits forever.
    Block {
        #[serde(rename = "timeout_ms", default, with = "opt_millis")]
        timeout: Option<Duration>,
        #[serde(
            rename = "poll_interval_us",
            default = "default_poll_interval",
            with = "micros"
        )]
        poll_interval: Duration,
    },
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::bounded(Duration::from_millis(DEFAULT_BLOCK_TIMEOUT_MS))
    }
}

impl BackpressurePolicy {
    pub fn bounded(timeout: Duration) -> Self {
        Self::Block {
            timeout: Some(timeout),
            poll_interval: default_poll_interval(),
        }
    }

    pub fn unbounded() -> Self {
        Self::Block {
            timeout: None,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Fate of messages still queued when the cache shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Apply every queued message before the consumer exits.
    #[default]
    Flush,
    /// Discard queued messages.
    Drop,
}

/// Configuration for a [`crate::MessageCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Ingestion queue capacity in messages.
    /// Default: 100_000
    pub queue_capacity: usize,

    /// Full-queue behaviour.
    /// Default: block for up to 50 ms, then reject
    pub backpressure: BackpressurePolicy,

    /// Distinct-timestamp ordering strategy.
    /// Default: lazy sort
    pub ordering: OrderingStrategy,

    /// Shutdown behaviour for queued messages.
    /// Default: flush
    pub drain: DrainPolicy,

    /// CPU core to pin the ingest consumer thread to.
    /// Default: unpinned
    pub consumer_core: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            ordering: OrderingStrategy::default(),
            drain: DrainPolicy::default(),
            consumer_core: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small queue that rejects as soon as it is full.
    pub fn fail_fast(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            backpressure: BackpressurePolicy::FailFast,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    #[must_use]
    pub fn with_backpressure(mut self, backpressure: BackpressurePolicy) -> Self {
        self.backpressure = backpressure;
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: OrderingStrategy) -> Self {
        self.ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_drain(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    #[must_use]
    pub fn with_consumer_core(mut self, core: usize) -> Self {
        self.consumer_core = Some(core);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        if let BackpressurePolicy::Block { poll_interval, .. } = self.backpressure {
            if poll_interval.is_zero() {
                return Err(Error::InvalidConfig(
                    "poll_interval must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Reads a JSON config file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_micros(BACKPRESSURE_POLL_US)
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(d)?))
    }
}
