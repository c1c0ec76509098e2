//! Cache capabilities for query results.
//!
//! Reads are cached under keys built by [`quarry_core::CacheKeyBuilder`] and
//! evicted by pattern after writes. Staleness is bounded by the entry TTL and
//! by invalidation; a read racing a write may repopulate an entry just before
//! it is cleared, and the next write or the TTL repairs it.

pub mod memory;
pub mod traits;

pub use memory::InMemoryCache;
pub use traits::{CacheClear, CacheStats, CacheStore};
