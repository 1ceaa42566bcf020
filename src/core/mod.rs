//! In-memory message cache: key allocation, storage, timestamp index and
//! the ingestion pipeline that ties them together.

pub mod allocator;
pub mod cache;
pub mod index;
pub mod ingest;
pub mod message;
pub mod order;
mod query;
pub mod store;

pub use allocator::PkAllocator;
pub use cache::{CacheStats, MessageCache};
pub use index::TimestampIndex;
pub use ingest::{Ingestor, ShutdownReport};
pub use message::{Message, NewMessage};
pub use order::{LazySortedList, OrderingStrategy, TimestampOrder, TreeOrder};
pub use store::Store;
