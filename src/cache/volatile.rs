//! Volatile LRU Cache Module
//!
//! Wraps [`BoundedCache`] with per-key TTL expiry and least-recently-used
//! eviction. The byte budget is still enforced by the bounded layer; this
//! layer only decides *which* keys give way, replacing the bounded
//! layer's random victim policy with its own ordering.
//!
//! Per-key bookkeeping lives in a link arena whose nodes sit in two
//! circular cycles at once: recency order (maintained on reads and
//! writes) and insertion order (used to approximate expiry order for the
//! lazy sweep). One lock guards the arena and the key-to-link map; it is
//! held for whole link relocations so no task can observe a half-updated
//! cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::cache::bounded::BoundedCache;
use crate::cache::link::LinkArena;
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Link State ==
/// The link arena plus the key lookup into it.
///
/// The lookup's key set always equals the key set of the bounded cache
/// below.
#[derive(Debug)]
struct LinkState {
    arena: LinkArena,
    index: HashMap<String, usize>,
}

#[derive(Debug)]
struct VolatileInner {
    cache: BoundedCache,
    state: Mutex<LinkState>,
    default_ttl: Duration,
    stats: CacheStats,
}

// == Volatile LRU Cache ==
/// A byte-budgeted cache with TTL expiration and LRU eviction.
///
/// Handles are cheap to clone and share one underlying cache.
#[derive(Debug, Clone)]
pub struct VolatileLruCache {
    inner: Arc<VolatileInner>,
}

impl VolatileLruCache {
    // == Constructor ==
    /// Creates a new cache.
    ///
    /// # Arguments
    /// * `max_size` - Total byte budget for stored values
    /// * `shard_count` - Number of shards (must be >= 1)
    /// * `default_ttl` - TTL applied when `set` is not given an override
    pub fn new(max_size: usize, shard_count: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(VolatileInner {
                cache: BoundedCache::new(max_size, shard_count),
                state: Mutex::new(LinkState {
                    arena: LinkArena::new(),
                    index: HashMap::new(),
                }),
                default_ttl,
                stats: CacheStats::new(),
            }),
        }
    }

    /// Creates a new cache from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_size_bytes,
            config.shard_count,
            Duration::from_secs(config.default_ttl),
        )
    }

    /// Returns the configured byte budget.
    pub fn max_size(&self) -> usize {
        self.inner.cache.max_size()
    }

    /// Returns the TTL used when `set` is not given an override.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Returns cache statistics for this layer.
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    // == Set ==
    /// Stores a key-value pair with its declared size and an optional TTL
    /// override (`None` uses the default TTL).
    ///
    /// Expired entries are swept first. If space is still short, the
    /// least recently used entries are evicted one at a time until the
    /// value fits. The key then becomes the most recent entry in both the
    /// recency and insertion orders, with expiry `now + ttl`.
    ///
    /// A zero-duration override stores a value that is already expired:
    /// it occupies space until swept but is never readable.
    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        size: usize,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let inner = &*self.inner;
        let mut state = inner.state.lock().await;
        let now = Instant::now();
        self.sweep_locked(&mut state, now).await;

        loop {
            match inner.cache.set(key, value.clone(), size).await {
                Ok(()) => break,
                Err(CacheError::LowSpace { .. }) => self.evict_lru_locked(&mut state).await?,
                Err(other) => return Err(other),
            }
        }

        let expires_at = now + ttl.unwrap_or(inner.default_ttl);
        match state.index.get(key).copied() {
            Some(slot) => state.arena.relink(slot, expires_at, size),
            None => {
                let slot = state.arena.insert(key.to_owned(), expires_at, size);
                state.index.insert(key.to_owned(), slot);
            }
        }
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// An entry whose TTL has passed reads as absent even while it is
    /// still physically stored; removal is left to the sweep. A live read
    /// promotes the key to most recently used without touching its
    /// position in the insertion order.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let inner = &*self.inner;
        let value = inner.cache.get(key).await;

        let mut state = inner.state.lock().await;
        let slot = match state.index.get(key).copied() {
            Some(slot) => slot,
            None => {
                inner.stats.record_miss();
                return None;
            }
        };
        if value.is_none() {
            inner.stats.record_miss();
            return None;
        }
        if state.arena.get(slot).is_expired(Instant::now()) {
            inner.stats.record_miss();
            inner.stats.record_expiration();
            return None;
        }
        state.arena.touch_lru(slot);
        inner.stats.record_hit();
        value
    }

    // == Delete ==
    /// Removes an entry by key, discarding its link. Expired entries are
    /// swept first. Silent no-op when the key is absent.
    pub async fn delete(&self, key: &str) {
        let inner = &*self.inner;
        let mut state = inner.state.lock().await;
        self.sweep_locked(&mut state, Instant::now()).await;

        inner.cache.delete(key).await;
        if let Some(slot) = state.index.remove(key) {
            state.arena.remove(slot);
        }
    }

    // == Clear ==
    /// Removes every entry and resets both cycles to just the root.
    pub async fn clear(&self) {
        let inner = &*self.inner;
        let mut state = inner.state.lock().await;
        inner.cache.clear().await;
        state.arena.clear();
        state.index.clear();
    }

    // == Current Size ==
    /// Returns the sum of declared sizes of all stored entries, including
    /// expired ones not yet swept.
    pub async fn current_size(&self) -> usize {
        self.inner.cache.current_size().await
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not
    /// yet swept.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.arena.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Sweep Expired ==
    /// Removes expired entries from the oldest end of the insertion
    /// order, stopping at the first entry that has not expired. Returns
    /// the number of entries removed.
    ///
    /// Insertion order tracks expiry order as long as every key uses the
    /// default TTL. A key given a shorter override behind a longer-lived
    /// entry is not reached by the sweep until it becomes the oldest; it
    /// still reads as absent the moment it expires, so the only cost is
    /// delayed space reclamation.
    pub async fn sweep_expired(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        self.sweep_locked(&mut state, Instant::now()).await
    }

    async fn sweep_locked(&self, state: &mut LinkState, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(slot) = state.arena.oldest_ttl() {
            if !state.arena.get(slot).is_expired(now) {
                break;
            }
            let key = state.arena.get(slot).key.clone();
            self.inner.cache.delete(&key).await;
            state.index.remove(&key);
            state.arena.remove(slot);
            self.inner.stats.record_expiration();
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "swept expired entries");
        }
        removed
    }

    // == Evict Least Recently Used ==
    /// Removes the entry at the old end of the recency cycle, deleting
    /// its key from the bounded cache and discarding its link. Fails with
    /// `EvictionExhausted` when only the root remains.
    async fn evict_lru_locked(&self, state: &mut LinkState) -> Result<()> {
        let slot = state.arena.oldest_lru().ok_or(CacheError::EvictionExhausted)?;
        let key = state.arena.get(slot).key.clone();
        self.inner.cache.delete(&key).await;
        state.index.remove(&key);
        state.arena.remove(slot);
        self.inner.stats.record_eviction();
        debug!(key = %key, "evicted least recently used entry");
        Ok(())
    }

    // == Iterate ==
    /// Streams live entries oldest-first by insertion order.
    ///
    /// The traversal order is captured when the producer starts; each
    /// entry is then checked for expiry and re-fetched from the bounded
    /// cache at handoff time. Expired or deleted entries are skipped, not
    /// treated as the end of the stream. The channel holds a single item,
    /// so the producer waits for the consumer between entries, and it
    /// stops as soon as the receiver is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn iter(&self) -> mpsc::Receiver<(String, Bytes)> {
        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let snapshot: Vec<(String, Instant)> = {
                let state = inner.state.lock().await;
                state
                    .arena
                    .ttl_order()
                    .into_iter()
                    .map(|slot| {
                        let link = state.arena.get(slot);
                        (link.key.clone(), link.expires_at)
                    })
                    .collect()
            };
            for (key, expires_at) in snapshot {
                if expires_at <= Instant::now() {
                    continue;
                }
                if let Some(value) = inner.cache.get(&key).await {
                    if tx.send((key, value)).await.is_err() {
                        return;
                    }
                }
            }
        });
        rx
    }

    /// Checks the cross-layer bookkeeping: the link map, both cycles and
    /// the bounded cache must all agree on the set of live keys, and the
    /// size counter must match the recomputed sum.
    #[cfg(test)]
    pub(crate) async fn bookkeeping_consistent(&self) -> bool {
        let inner = &*self.inner;
        let state = inner.state.lock().await;

        let ttl_order = state.arena.ttl_order();
        let lru_order = state.arena.lru_order();
        if ttl_order.len() != state.index.len() || lru_order.len() != state.index.len() {
            return false;
        }
        let mut ttl_sorted = ttl_order;
        let mut lru_sorted = lru_order;
        ttl_sorted.sort_unstable();
        lru_sorted.sort_unstable();
        if ttl_sorted != lru_sorted {
            return false;
        }
        for (key, slot) in &state.index {
            if state.arena.get(*slot).key != *key {
                return false;
            }
            if inner.cache.get(key).await.is_none() {
                return false;
            }
        }
        if inner.cache.len().await != state.index.len() {
            return false;
        }
        inner.cache.accounting_consistent().await
    }
}
