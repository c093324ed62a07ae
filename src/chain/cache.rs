//! Funding-source cache
//!
//! Funding lookups are the expensive part of a run (one `eth_getLogs` over a
//! wide block window per wallet). Results are cached per wallet with a TTL
//! and shared across runs; everything else a run touches is local to it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::chain::funding::FundingSource;

/// Configuration for the funding cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for each entry
    pub ttl: Duration,
    /// Maximum entries before eviction
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600), // 1 hour
            max_entries: 10_000,
        }
    }
}

/// Entry in the funding cache with TTL
#[derive(Clone)]
pub struct CachedFunding {
    pub sources: Vec<FundingSource>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedFunding {
    pub fn new(sources: Vec<FundingSource>, ttl: Duration) -> Self {
        Self {
            sources,
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Cache statistics for monitoring
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Wallet -> funding sources, with expiry
pub struct FundingCache {
    config: CacheConfig,
    entries: DashMap<String, CachedFunding>,
    /// Per-wallet locks so only one fetch per wallet is in flight
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    stats: CacheStats,
}

impl FundingCache {
    /// Create a new cache with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a new cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity(config.max_entries.min(1_024)),
            key_locks: DashMap::new(),
            stats: CacheStats::default(),
            config,
        }
    }

    /// Get funding sources for a wallet, counting the hit or miss
    pub fn get(&self, wallet: &str) -> Option<Vec<FundingSource>> {
        let found = self.peek(wallet);
        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Get funding sources without touching statistics
    pub fn peek(&self, wallet: &str) -> Option<Vec<FundingSource>> {
        if let Some(entry) = self.entries.get(wallet) {
            if !entry.is_expired() {
                return Some(entry.sources.clone());
            }
            // Entry expired, remove it
            drop(entry);
            self.entries.remove_if(wallet, |_, e| e.is_expired());
        }
        None
    }

    /// Store funding sources for a wallet
    pub fn insert(&self, wallet: &str, sources: Vec<FundingSource>) {
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(wallet) {
            self.evict();
        }
        self.entries
            .insert(wallet.to_string(), CachedFunding::new(sources, self.config.ttl));
    }

    /// Drop expired entries, then ~10% of the rest if still full
    fn evict(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());

        if self.entries.len() >= self.config.max_entries {
            let to_remove = (self.config.max_entries / 10).max(1);
            let keys: Vec<String> = self
                .entries
                .iter()
                .take(to_remove)
                .map(|r| r.key().clone())
                .collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }

        let removed = before.saturating_sub(self.entries.len());
        self.stats.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Lock guarding fetches for one wallet
    pub fn key_lock(&self, wallet: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(wallet.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget a wallet's lock once nobody else holds it
    pub fn release_key_lock(&self, wallet: &str) {
        self.key_locks
            .remove_if(wallet, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for FundingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(address: &str, amount: f64) -> FundingSource {
        FundingSource {
            address: address.to_string(),
            amount,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = FundingCache::new();
        cache.insert("0xa", vec![source("0xf", 150.0)]);

        let hit = cache.get("0xa").unwrap();
        assert_eq!(hit, vec![source("0xf", 150.0)]);
        assert!(cache.get("0xb").is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = FundingCache::with_config(CacheConfig {
            ttl: Duration::ZERO,
            max_entries: 10,
        });
        cache.insert("0xa", vec![source("0xf", 150.0)]);

        assert!(cache.get("0xa").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_stats() {
        let cache = FundingCache::new();

        cache.get("nonexistent"); // miss
        cache.insert("exists", vec![]);
        cache.get("exists"); // hit
        cache.get("exists"); // hit
        cache.peek("exists"); // not counted

        let stats = cache.stats();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 2);
        assert_eq!(stats.misses.load(Ordering::Relaxed), 1);
        assert!((stats.hit_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = FundingCache::with_config(CacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 10,
        });
        for i in 0..25 {
            cache.insert(&format!("0x{}", i), vec![]);
        }
        assert!(cache.len() <= 10);
        assert!(cache.stats().evictions.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn test_key_lock_is_shared_then_released() {
        let cache = FundingCache::new();
        let first = cache.key_lock("0xa");
        let second = cache.key_lock("0xa");
        assert!(Arc::ptr_eq(&first, &second));

        let guard = first.lock().await;
        assert!(second.try_lock().is_err());
        drop(guard);

        drop(first);
        drop(second);
        cache.release_key_lock("0xa");
        assert!(cache.key_locks.is_empty());
    }
}
