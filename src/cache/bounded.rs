//! Bounded Cache Module
//!
//! Byte-budgeted storage over a sharded store. Tracks a per-key size
//! ledger against an immutable capacity and reclaims space by evicting an
//! arbitrary entry from a randomly probed shard.
//!
//! # Lock discipline
//!
//! The cache-wide accounting lock guards the size ledger; shard locks
//! guard map contents. Whenever both are needed the accounting lock is
//! acquired first, and no operation ever holds two shard locks. The
//! victim shard for an eviction is chosen before any lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::cache::shard::ShardedStore;
use crate::cache::stats::CacheStats;
use crate::error::{CacheError, Result};

// == Size Ledger ==
/// Aggregate size accounting, guarded by the cache-wide lock.
///
/// `current` always equals the sum of `per_key` values.
#[derive(Debug, Default)]
struct SizeLedger {
    current: usize,
    per_key: HashMap<String, usize>,
}

impl SizeLedger {
    fn forget(&mut self, key: &str) {
        if let Some(size) = self.per_key.remove(key) {
            self.current -= size;
        }
    }
}

#[derive(Debug)]
struct BoundedInner {
    max_size: usize,
    store: ShardedStore,
    ledger: Mutex<SizeLedger>,
    stats: CacheStats,
}

// == Bounded Cache ==
/// A concurrent key/value cache with a fixed byte budget.
///
/// Handles are cheap to clone and share one underlying cache.
#[derive(Debug, Clone)]
pub struct BoundedCache {
    inner: Arc<BoundedInner>,
}

impl BoundedCache {
    // == Constructor ==
    /// Creates a new cache with the given byte budget and shard count.
    ///
    /// # Arguments
    /// * `max_size` - Total byte budget for stored values
    /// * `shard_count` - Number of shards (must be >= 1)
    pub fn new(max_size: usize, shard_count: usize) -> Self {
        Self {
            inner: Arc::new(BoundedInner {
                max_size,
                store: ShardedStore::new(shard_count),
                ledger: Mutex::new(SizeLedger::default()),
                stats: CacheStats::new(),
            }),
        }
    }

    /// Returns the configured byte budget.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    // == Get ==
    /// Retrieves a value by key. Read-only; never evicts.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let shard = self.inner.store.shard_for(key).read().await;
        match shard.get(key) {
            Some(value) => {
                self.inner.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Stores a key-value pair with its declared size. Single attempt; no
    /// eviction.
    ///
    /// Fails with `SizeLimit` if the value alone exceeds the budget, and
    /// with `LowSpace` if the key is new (or growing) and the budget is
    /// currently insufficient. An overwrite that does not grow the entry
    /// is always admitted. On failure the cache is left unchanged.
    pub async fn set(&self, key: &str, value: Bytes, size: usize) -> Result<()> {
        let inner = &*self.inner;
        if size > inner.max_size {
            return Err(CacheError::SizeLimit {
                size,
                max_size: inner.max_size,
            });
        }

        let mut ledger = inner.ledger.lock().await;
        let existing = ledger.per_key.get(key).copied();
        let grows = existing.map_or(true, |old| size > old);
        if grows && ledger.current + size > inner.max_size {
            return Err(CacheError::LowSpace {
                size,
                available: inner.max_size - ledger.current,
            });
        }

        // The ledger lock is held across the shard write so the value and
        // its accounting move together.
        {
            let mut shard = inner.store.shard_for(key).write().await;
            shard.insert(key.to_owned(), value);
        }
        // Overwrite is delete-then-insert as far as accounting goes.
        if let Some(old) = existing {
            ledger.current -= old;
        }
        ledger.current += size;
        ledger.per_key.insert(key.to_owned(), size);
        Ok(())
    }

    // == Set With Eviction ==
    /// Stores a key-value pair, evicting entries as needed to make room.
    ///
    /// `SizeLimit` is returned before any eviction is attempted and is
    /// never retried. On `LowSpace` one victim is evicted and the set is
    /// retried, until it succeeds or nothing remains to evict.
    pub async fn set_with_eviction(&self, key: &str, value: Bytes, size: usize) -> Result<()> {
        loop {
            match self.set(key, value.clone(), size).await {
                Err(CacheError::LowSpace { .. }) => self.evict_one_victim().await?,
                other => return other,
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key. Silent no-op when the key is absent.
    pub async fn delete(&self, key: &str) {
        let inner = &*self.inner;
        let mut ledger = inner.ledger.lock().await;
        {
            let mut shard = inner.store.shard_for(key).write().await;
            shard.remove(key);
        }
        ledger.forget(key);
    }

    // == Clear ==
    /// Removes every entry and resets the size accounting.
    pub async fn clear(&self) {
        let inner = &*self.inner;
        let mut ledger = inner.ledger.lock().await;
        inner.store.clear().await;
        ledger.per_key.clear();
        ledger.current = 0;
    }

    // == Current Size ==
    /// Returns the sum of declared sizes of all stored entries.
    pub async fn current_size(&self) -> usize {
        self.inner.ledger.lock().await.current
    }

    // == Length ==
    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.inner.ledger.lock().await.per_key.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Iterate ==
    /// Streams all entries over a bounded channel.
    ///
    /// A background producer walks the shards in index order, snapshotting
    /// one shard at a time under its read lock; writes that land after a
    /// shard was visited are not reflected. The channel holds a single
    /// item, so the producer waits for the consumer between entries, and
    /// it stops as soon as the receiver is dropped. The channel closes
    /// when traversal completes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn iter(&self) -> mpsc::Receiver<(String, Bytes)> {
        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for index in 0..inner.store.shard_count() {
                let entries: Vec<(String, Bytes)> = {
                    let shard = inner.store.shard_at(index).read().await;
                    shard
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                };
                for entry in entries {
                    if tx.send(entry).await.is_err() {
                        return;
                    }
                }
            }
        });
        rx
    }

    // == Evict One Victim ==
    /// Removes an arbitrary entry from a randomly probed shard.
    ///
    /// The probe shard is chosen by hashing a fresh random token before
    /// any lock is taken, so victim selection never holds a lock. A probe
    /// that lands on an empty shard removes nothing; the caller's retry
    /// loop tolerates that, and progress is guaranteed because probes are
    /// uniform over shards while any key exists. Fails with
    /// `EvictionExhausted` only when the cache holds no keys at all.
    async fn evict_one_victim(&self) -> Result<()> {
        let inner = &*self.inner;
        let token = rand::thread_rng().gen::<u64>().to_string();
        let index = inner.store.shard_index(&token);

        let mut ledger = inner.ledger.lock().await;
        if ledger.per_key.is_empty() {
            return Err(CacheError::EvictionExhausted);
        }
        let victim = {
            let mut shard = inner.store.shard_at(index).write().await;
            let key = shard.keys().next().cloned();
            if let Some(ref key) = key {
                shard.remove(key);
            }
            key
        };
        if let Some(key) = victim {
            ledger.forget(&key);
            inner.stats.record_eviction();
            debug!(key = %key, "evicted random victim to reclaim space");
        }
        Ok(())
    }

    /// Checks that the running size counter matches the recomputed sum of
    /// per-key sizes, and that the ledger key set matches the shards.
    #[cfg(test)]
    pub(crate) async fn accounting_consistent(&self) -> bool {
        let inner = &*self.inner;
        let ledger = inner.ledger.lock().await;
        let recomputed: usize = ledger.per_key.values().sum();
        if recomputed != ledger.current {
            return false;
        }
        let mut stored = 0;
        for index in 0..inner.store.shard_count() {
            let shard = inner.store.shard_at(index).read().await;
            for key in shard.keys() {
                if !ledger.per_key.contains_key(key) {
                    return false;
                }
            }
            stored += shard.len();
        }
        stored == ledger.per_key.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = BoundedCache::new(100, 4);

        cache
            .set("key1", Bytes::from_static(b"value1"), 6)
            .await
            .unwrap();
        assert_eq!(cache.get("key1").await, Some(Bytes::from_static(b"value1")));
        assert_eq!(cache.current_size().await, 6);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = BoundedCache::new(100, 4);
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_set_rejects_oversized_value() {
        let cache = BoundedCache::new(10, 4);

        let result = cache.set("big", Bytes::from_static(b"x"), 11).await;
        assert_eq!(
            result,
            Err(CacheError::SizeLimit { size: 11, max_size: 10 })
        );
        // failed set leaves no trace
        assert_eq!(cache.get("big").await, None);
        assert_eq!(cache.current_size().await, 0);
    }

    #[tokio::test]
    async fn test_set_low_space_without_eviction() {
        let cache = BoundedCache::new(10, 1);

        cache.set("a", Bytes::from_static(b"aaaaa"), 5).await.unwrap();
        cache.set("b", Bytes::from_static(b"bbbbb"), 5).await.unwrap();

        let result = cache.set("c", Bytes::from_static(b"c"), 1).await;
        assert_eq!(result, Err(CacheError::LowSpace { size: 1, available: 0 }));
        assert_eq!(cache.current_size().await, 10);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_accounting() {
        let cache = BoundedCache::new(100, 4);

        cache.set("key", Bytes::from_static(b"12345"), 5).await.unwrap();
        cache.set("key", Bytes::from_static(b"123"), 3).await.unwrap();

        assert_eq!(cache.current_size().await, 3);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("key").await, Some(Bytes::from_static(b"123")));
    }

    #[tokio::test]
    async fn test_shrinking_overwrite_admitted_at_full_capacity() {
        let cache = BoundedCache::new(10, 1);

        cache.set("a", Bytes::from_static(b"aaaaa"), 5).await.unwrap();
        cache.set("b", Bytes::from_static(b"bbbbb"), 5).await.unwrap();

        // same-size overwrite while the budget is fully occupied
        cache.set("a", Bytes::from_static(b"AAAAA"), 5).await.unwrap();
        assert_eq!(cache.current_size().await, 10);
        assert_eq!(cache.get("a").await, Some(Bytes::from_static(b"AAAAA")));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let cache = BoundedCache::new(100, 4);
        cache.set("key", Bytes::from_static(b"v"), 1).await.unwrap();

        cache.delete("missing").await;

        assert_eq!(cache.current_size().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_accounting() {
        let cache = BoundedCache::new(100, 4);
        cache.set("key", Bytes::from_static(b"value"), 5).await.unwrap();

        cache.delete("key").await;

        assert_eq!(cache.get("key").await, None);
        assert_eq!(cache.current_size().await, 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = BoundedCache::new(100, 4);
        for i in 0..10 {
            cache
                .set(&format!("key{}", i), Bytes::from_static(b"v"), 1)
                .await
                .unwrap();
        }

        cache.clear().await;

        assert_eq!(cache.current_size().await, 0);
        assert!(cache.is_empty().await);
        assert_eq!(cache.get("key0").await, None);
    }

    #[tokio::test]
    async fn test_set_with_eviction_reclaims_space() {
        let cache = BoundedCache::new(15, 1);

        cache
            .set_with_eviction("vivek", Bytes::from_static(b"vivek"), 5)
            .await
            .unwrap();
        cache
            .set_with_eviction("ibibo", Bytes::from_static(b"ibibo"), 5)
            .await
            .unwrap();
        cache
            .set_with_eviction("spectre", Bytes::from_static(b"spectre"), 7)
            .await
            .unwrap();

        // one 5-byte victim evicted to fit the 7-byte value
        assert_eq!(cache.current_size().await, 12);
        assert_eq!(cache.len().await, 2);
        assert_eq!(
            cache.get("spectre").await,
            Some(Bytes::from_static(b"spectre"))
        );
        assert_eq!(cache.stats().snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn test_set_with_eviction_never_retries_size_limit() {
        let cache = BoundedCache::new(10, 4);
        cache.set("a", Bytes::from_static(b"aaaaa"), 5).await.unwrap();

        let result = cache
            .set_with_eviction("big", Bytes::from_static(b"x"), 11)
            .await;

        assert_eq!(
            result,
            Err(CacheError::SizeLimit { size: 11, max_size: 10 })
        );
        // nothing was evicted for the doomed set
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.stats().snapshot().evictions, 0);
    }

    #[tokio::test]
    async fn test_evict_on_empty_cache_is_exhausted() {
        let cache = BoundedCache::new(10, 4);
        let result = cache.evict_one_victim().await;
        assert_eq!(result, Err(CacheError::EvictionExhausted));
    }

    #[tokio::test]
    async fn test_eviction_tolerates_empty_shard_probes() {
        // many shards, one key: most probes land on empty shards
        let cache = BoundedCache::new(5, 64);
        cache.set("only", Bytes::from_static(b"aaaaa"), 5).await.unwrap();

        cache
            .set_with_eviction("other", Bytes::from_static(b"bbbbb"), 5)
            .await
            .unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("other").await, Some(Bytes::from_static(b"bbbbb")));
    }

    #[tokio::test]
    async fn test_iter_yields_all_entries() {
        let cache = BoundedCache::new(100, 4);
        for i in 0..10 {
            cache
                .set(&format!("key{}", i), Bytes::from(format!("value{}", i)), 1)
                .await
                .unwrap();
        }

        let mut rx = cache.iter();
        let mut seen = std::collections::HashMap::new();
        while let Some((key, value)) = rx.recv().await {
            seen.insert(key, value);
        }

        assert_eq!(seen.len(), 10);
        for i in 0..10 {
            assert_eq!(
                seen.get(&format!("key{}", i)),
                Some(&Bytes::from(format!("value{}", i)))
            );
        }
    }

    #[tokio::test]
    async fn test_iter_with_dropped_receiver_stops_producer() {
        let cache = BoundedCache::new(100, 4);
        for i in 0..10 {
            cache
                .set(&format!("key{}", i), Bytes::from_static(b"v"), 1)
                .await
                .unwrap();
        }

        let mut rx = cache.iter();
        let first = rx.recv().await;
        assert!(first.is_some());
        drop(rx);

        // cache still fully usable; producer exits on its next send
        cache.set("after", Bytes::from_static(b"v"), 1).await.unwrap();
        assert_eq!(cache.len().await, 11);
    }

    #[tokio::test]
    async fn test_accounting_survives_mixed_operations() {
        let cache = BoundedCache::new(50, 4);

        for i in 0..20 {
            let key = format!("key{}", i % 7);
            cache
                .set_with_eviction(&key, Bytes::from_static(b"vvv"), 3 + i % 3)
                .await
                .unwrap();
            if i % 5 == 0 {
                cache.delete(&key).await;
            }
        }

        assert!(cache.accounting_consistent().await);
        assert!(cache.current_size().await <= 50);
    }
}
