//! QUARRY Storage - Query Helpers and Cache Invalidation
//!
//! Binds a [`FieldPolicy`](quarry_core::FieldPolicy) to a [`DocumentStore`]
//! through [`Model`], which provides `list`, `get`, `number_of` and `patch`
//! along with the write helpers. Reads are cached through the optional
//! [`CacheStore`] capability; writes invalidate through [`CacheClear`].
//!
//! [`MockDatabase`] and [`InMemoryCache`] are in-memory collaborators for
//! tests.

pub mod cache;
pub mod invalidation;
pub mod mock;
pub mod model;
pub mod store;

pub use cache::{CacheClear, CacheStats, CacheStore, InMemoryCache};
pub use invalidation::InvalidationDispatcher;
pub use mock::{MockCollection, MockDatabase};
pub use model::Model;
pub use store::DocumentStore;
