//! Versioned response caches and the request interceptor built on them.
//!
//! This module provides:
//! - Named, version-tagged caches (one static and one dynamic generation live)
//! - A cache store capability with SQLite and in-memory backends
//! - Cache-first request handling with dynamic caching of eligible responses
//! - Offline fallbacks when both the cache and the network miss

mod fallback;
mod generation;
mod layer;
mod memory;
mod policy;
mod storage;
mod traits;

pub use generation::{CacheGeneration, GenerationSet};
pub use layer::{CacheLayer, FetchOutcome, Served};
pub use memory::MemoryStorage;
pub use policy::CacheablePolicy;
pub use storage::SqliteStorage;
pub use traits::{CacheStore, CacheSummary, ResponseSource};
