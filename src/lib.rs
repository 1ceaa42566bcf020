//! Timestamped message cache with recency-ordered listings.
//!
//! Messages enter through a bounded queue drained by one consumer thread,
//! which assigns increasing primary keys and indexes them by timestamp.
//! Reads return the newest messages first or every message for a given
//! timestamp. Nothing is persisted or evicted.

pub mod api;
pub mod config;
pub mod core;
pub mod error;

pub use config::{BackpressurePolicy, CacheConfig, DrainPolicy};
pub use crate::core::{
    CacheStats, Ingestor, Message, MessageCache, NewMessage, OrderingStrategy, ShutdownReport,
};
pub use error::{Error, Result};
