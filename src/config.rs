//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total byte budget for stored values
    pub max_size_bytes: usize,
    /// Number of shards the key space is partitioned into (must be >= 1)
    pub shard_count: usize,
    /// Default TTL in seconds for entries without an explicit TTL
    pub default_ttl: u64,
    /// Background sweep task interval in seconds
    pub sweep_interval: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE_BYTES` - Total byte budget (default: 16 MiB)
    /// - `SHARD_COUNT` - Number of shards (default: 16)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        Self {
            max_size_bytes: env::var("MAX_SIZE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16 * 1024 * 1024),
            shard_count: env::var("SHARD_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
            default_ttl: env::var("DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            sweep_interval: env::var("SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 16 * 1024 * 1024,
            shard_count: 16,
            default_ttl: 300,
            sweep_interval: 1,
        }
    }
}
