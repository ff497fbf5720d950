//! Accounting-side caching for LedgerBridge.
//!
//! The accounting service is slow and rate limited, so every read goes
//! through [`EntityCache`] and every write invalidates it. [`CachedAccounting`]
//! ties the two together and is the only handle the rest of the system gets.

pub mod cached_client;
pub mod entity_cache;

pub use cached_client::{CachedAccounting, FetchOrigin, Fetched};
pub use entity_cache::{CacheStats, DEFAULT_CACHE_TTL, EntityCache, MAX_CACHE_WINDOW, StaleHit};
