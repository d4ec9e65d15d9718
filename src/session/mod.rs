//! Session context storage.
//!
//! The store holds one analysis session and persists it through a
//! fast-cache-then-fallback policy.

pub mod cache;
pub mod store;

pub use cache::{CacheBackend, HttpCacheBackend, MemoryCacheBackend};
pub use store::ContextStore;
