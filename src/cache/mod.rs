//! Cache Module
//!
//! Provides sharded in-memory caching with a byte budget, TTL expiration
//! and LRU eviction.
//!
//! The module is layered: [`ShardedStore`] is a plain partitioned map
//! with no policy, [`BoundedCache`] adds the byte budget and stochastic
//! eviction, and [`VolatileLruCache`] adds per-key TTL expiry and LRU
//! eviction on top.

mod bounded;
mod link;
mod shard;
mod stats;
mod volatile;


// Re-export public types
pub use bounded::BoundedCache;
pub use shard::{ShardMap, ShardedStore};
pub use stats::{CacheStats, StatsSnapshot};
pub use volatile::VolatileLruCache;
