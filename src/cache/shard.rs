//! Sharded Store Module
//!
//! Partitions the key space across independently locked maps so that
//! operations on different keys can proceed in parallel.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};

use bytes::Bytes;
use tokio::sync::RwLock;

/// One partition of the key space, guarded by its own reader/writer lock.
pub type ShardMap = RwLock<HashMap<String, Bytes>>;

// == Sharded Store ==
/// A fixed-length sequence of shards with deterministic key routing.
///
/// Shard selection is a pure function of the key and the partition count,
/// both fixed for the store's lifetime. Every operation that touches a
/// specific key must route through [`ShardedStore::shard_for`] so all
/// layers agree on shard ownership.
///
/// This layer enforces no size limits and holds no policy.
#[derive(Debug)]
pub struct ShardedStore {
    /// The shard partitions
    shards: Vec<ShardMap>,
    /// Hasher state for routing, seeded once per store
    hasher: RandomState,
}

impl ShardedStore {
    // == Constructor ==
    /// Creates a new store with the given number of shards.
    ///
    /// # Panics
    /// Panics if `shard_count` is zero.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count >= 1, "shard count must be at least 1");

        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(HashMap::new()));
        }

        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    // == Routing ==
    /// Returns the shard index owning `key`: `hash(key) % shard_count`.
    ///
    /// Deterministic for a given key for this store's lifetime.
    pub fn shard_index(&self, key: &str) -> usize {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Returns the shard owning `key`.
    pub fn shard_for(&self, key: &str) -> &ShardMap {
        &self.shards[self.shard_index(key)]
    }

    /// Returns the shard at a fixed position, for whole-store walks and
    /// victim probes.
    pub fn shard_at(&self, index: usize) -> &ShardMap {
        &self.shards[index]
    }

    // == Shard Count ==
    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    // == Clear ==
    /// Empties every shard.
    pub async fn clear(&self) {
        for shard in &self.shards {
            shard.write().await.clear();
        }
    }
}
