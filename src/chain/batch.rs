//! Rate-limited batch funding lookups
//!
//! Wallets already in the cache are answered immediately. The rest are
//! fetched in fixed-size batches: requests inside a batch run concurrently,
//! and a fixed delay separates batches to stay under upstream rate limits.
//! A failed lookup degrades to an empty source list for that wallet.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::cache::FundingCache;
use crate::chain::funding::{FundingSource, FundingSourceProvider};

/// Batch sizing and pacing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Concurrent lookups per batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(200),
        }
    }
}

/// Outcome of a single wallet lookup
enum Lookup {
    Cached(Vec<FundingSource>),
    Fetched(Vec<FundingSource>),
    Failed,
}

/// Funding sources for a set of wallets plus lookup accounting
#[derive(Debug, Clone, Default, Serialize)]
pub struct FundingLookup {
    /// Wallet -> sources; every requested wallet has an entry
    pub sources: HashMap<String, Vec<FundingSource>>,
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed: usize,
}

impl FundingLookup {
    /// Sources for one wallet (empty if unknown or failed)
    pub fn sources_for(&self, wallet: &str) -> &[FundingSource] {
        self.sources.get(wallet).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Cached, batched front-end over a [`FundingSourceProvider`]
pub struct BatchFundingFetcher {
    provider: Arc<dyn FundingSourceProvider>,
    cache: Arc<FundingCache>,
    config: BatchConfig,
}

impl BatchFundingFetcher {
    pub fn new(
        provider: Arc<dyn FundingSourceProvider>,
        cache: Arc<FundingCache>,
        config: BatchConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            config,
        }
    }

    /// Shared cache handle
    pub fn cache(&self) -> &Arc<FundingCache> {
        &self.cache
    }

    /// Look up funding sources for every wallet.
    ///
    /// Addresses are lowercased and deduplicated; order of the input only
    /// affects which batch a wallet lands in.
    pub async fn fetch_all(&self, wallets: &[String]) -> FundingLookup {
        let mut lookup = FundingLookup::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for wallet in wallets {
            let wallet = wallet.to_lowercase();
            if !seen.insert(wallet.clone()) {
                continue;
            }
            match self.cache.get(&wallet) {
                Some(sources) => {
                    lookup.cache_hits += 1;
                    lookup.sources.insert(wallet, sources);
                }
                None => pending.push(wallet),
            }
        }

        if pending.is_empty() {
            debug!(hits = lookup.cache_hits, "All funding lookups served from cache");
            return lookup;
        }

        let batch_size = self.config.batch_size.max(1);
        let batches = pending.len().div_ceil(batch_size);
        info!(
            wallets = pending.len(),
            cached = lookup.cache_hits,
            batches,
            "Fetching funding sources"
        );

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let results = join_all(batch.iter().map(|wallet| self.fetch_one(wallet))).await;
            for (wallet, result) in batch.iter().zip(results) {
                let sources = match result {
                    Lookup::Cached(sources) => {
                        lookup.cache_hits += 1;
                        sources
                    }
                    Lookup::Fetched(sources) => {
                        lookup.fetched += 1;
                        sources
                    }
                    Lookup::Failed => {
                        lookup.failed += 1;
                        Vec::new()
                    }
                };
                lookup.sources.insert(wallet.clone(), sources);
            }
            debug!(batch = index + 1, of = batches, "Funding batch complete");
        }

        if lookup.failed > 0 {
            warn!(
                failed = lookup.failed,
                fetched = lookup.fetched,
                "Some funding lookups failed; those wallets are treated as unfunded"
            );
        }
        lookup
    }

    /// Fetch one wallet under its key lock, re-checking the cache first so
    /// a concurrent run that just fetched it is reused
    async fn fetch_one(&self, wallet: &str) -> Lookup {
        let lock = self.cache.key_lock(wallet);
        let result = {
            let _guard = lock.lock().await;
            if let Some(sources) = self.cache.peek(wallet) {
                Lookup::Cached(sources)
            } else {
                match self.provider.funding_sources(wallet).await {
                    Ok(sources) => {
                        self.cache.insert(wallet, sources.clone());
                        Lookup::Fetched(sources)
                    }
                    Err(e) => {
                        warn!(wallet, error = %e, "Funding lookup failed");
                        Lookup::Failed
                    }
                }
            }
        };
        drop(lock);
        self.cache.release_key_lock(wallet);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::cache::CacheConfig;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts calls and tracks peak concurrency
    struct CountingProvider {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_for: Option<String>,
    }

    impl CountingProvider {
        fn new(fail_for: Option<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_for: fail_for.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl FundingSourceProvider for CountingProvider {
        async fn funding_sources(&self, wallet: &str) -> Result<Vec<FundingSource>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_for.as_deref() == Some(wallet) {
                return Err(Error::RpcExhausted { method: "eth_getLogs".to_string() });
            }
            Ok(vec![FundingSource {
                address: format!("funder-of-{}", wallet),
                amount: 200.0,
            }])
        }
    }

    fn fetcher(provider: Arc<CountingProvider>, batch_size: usize) -> BatchFundingFetcher {
        BatchFundingFetcher::new(
            provider,
            Arc::new(FundingCache::with_config(CacheConfig::default())),
            BatchConfig {
                batch_size,
                batch_delay: Duration::from_millis(5),
            },
        )
    }

    fn wallets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("0xw{}", i)).collect()
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_hits_cache() {
        let provider = Arc::new(CountingProvider::new(None));
        let fetcher = fetcher(provider.clone(), 2);
        let wallets = wallets(3);

        let first = fetcher.fetch_all(&wallets).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(first.fetched, 3);

        let second = fetcher.fetch_all(&wallets).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(second.cache_hits, 3);
        assert_eq!(second.fetched, 0);
        assert_eq!(first.sources, second.sources);
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency() {
        let provider = Arc::new(CountingProvider::new(None));
        let fetcher = fetcher(provider.clone(), 2);

        let lookup = fetcher.fetch_all(&wallets(5)).await;
        assert_eq!(lookup.sources.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_separates_batches() {
        let provider = Arc::new(CountingProvider::new(None));
        let fetcher = BatchFundingFetcher::new(
            provider.clone(),
            Arc::new(FundingCache::with_config(CacheConfig::default())),
            BatchConfig {
                batch_size: 2,
                batch_delay: Duration::from_secs(1),
            },
        );
        let wallets = wallets(5);

        // Three batches, two pauses between them
        let start = tokio::time::Instant::now();
        let first = fetcher.fetch_all(&wallets).await;
        assert_eq!(first.fetched, 5);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));

        // Fully cached: no batches, no pauses
        let start = tokio::time::Instant::now();
        let second = fetcher.fetch_all(&wallets).await;
        assert_eq!(second.cache_hits, 5);
        assert!(start.elapsed() < Duration::from_millis(1));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty() {
        let provider = Arc::new(CountingProvider::new(Some("0xw1")));
        let fetcher = fetcher(provider.clone(), 5);

        let lookup = fetcher.fetch_all(&wallets(3)).await;
        assert_eq!(lookup.failed, 1);
        assert!(lookup.sources_for("0xw1").is_empty());
        assert_eq!(lookup.sources_for("0xw0").len(), 1);
        assert_eq!(lookup.sources_for("0xw2").len(), 1);

        // Failures are not cached, so the wallet is retried next time
        fetcher.fetch_all(&wallets(3)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_duplicates_fetched_once() {
        let provider = Arc::new(CountingProvider::new(None));
        let fetcher = fetcher(provider.clone(), 5);

        let input = vec!["0xAA".to_string(), "0xaa".to_string(), "0xaa".to_string()];
        let lookup = fetcher.fetch_all(&input).await;
        assert_eq!(lookup.sources.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_inflight_fetch() {
        let provider = Arc::new(CountingProvider::new(None));
        let fetcher = Arc::new(fetcher(provider.clone(), 5));
        let wallets = wallets(2);

        let (a, b) = tokio::join!(fetcher.fetch_all(&wallets), fetcher.fetch_all(&wallets));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.sources, b.sources);
    }
}
