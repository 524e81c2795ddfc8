//! Shardcache - a sharded in-memory cache library
//!
//! Provides byte-budgeted key/value storage with TTL expiration and LRU
//! eviction, safe for concurrent use from many tasks.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{BoundedCache, CacheStats, ShardedStore, StatsSnapshot, VolatileLruCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
