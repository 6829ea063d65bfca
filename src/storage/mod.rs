//! In-memory freshness store
//!
//! Nothing is persisted: every entry lives for the life of the process and is
//! replaced only by a newer successful fetch.

pub mod cache;

pub use cache::{CacheKey, CacheStats, Cached, ReadingCache, TtlCache};
