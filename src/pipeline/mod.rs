//! End-to-end analysis run
//!
//! 1. Validate trades and group them by wallet
//! 2. Score wallets on a bounded pool of blocking workers
//! 3. Fetch funding sources for the most suspicious wallets
//! 4. Cluster them and fold memberships back into the wallet records
//! 5. Sort and summarize
//!
//! Every run keeps its intermediate state local. The funding cache is the
//! only state shared between runs, so concurrent runs are safe.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analysis::{aggregate_by_wallet, analyze_wallet, MarketIndex, Wallet, WalletAnalysis};
use crate::chain::{BatchFundingFetcher, FundingCache, OnChainFundingFetcher, RpcPool};
use crate::cluster::{build_clusters, Cluster, Clustering, ClusteringStats};
use crate::config::{AnalysisConfig, Config};
use crate::error::{Error, Result};
use crate::source::{
    collect_markets, collect_trades, MarketSource, PageLimits, ResolvedMarket, Trade, TradeSource,
};

pub mod detail;
pub mod report;

pub use detail::{AnnotatedTrade, WalletDetail};
pub use report::{AnalysisReport, FundingSummary, Summary};

/// Collect trades and resolved markets concurrently.
///
/// Upstream failures abort the collection: without trades there is nothing
/// to analyze.
pub async fn collect_dataset(
    trades: &dyn TradeSource,
    markets: &dyn MarketSource,
    trade_limits: &PageLimits,
    market_limits: &PageLimits,
) -> Result<(Vec<Trade>, Vec<ResolvedMarket>)> {
    let (trades, markets) = tokio::try_join!(
        collect_trades(trades, trade_limits),
        collect_markets(markets, market_limits),
    )
    .inspect_err(|e| {
        if e.is_upstream() {
            error!(error = %e, "Upstream unavailable, aborting run");
        }
    })?;
    info!(
        trades = trades.len(),
        markets = markets.len(),
        "Fetched upstream data"
    );
    Ok((trades, markets))
}

/// Runs the scoring and clustering pipeline
pub struct Analyzer {
    workers: usize,
    top_suspicious: usize,
    max_candidates: usize,
    funding: Option<Arc<BatchFundingFetcher>>,
}

impl Analyzer {
    /// Analyzer without clustering
    pub fn new(config: &AnalysisConfig, max_candidates: usize) -> Self {
        Self {
            workers: config.workers.max(1),
            top_suspicious: config.top_suspicious,
            max_candidates,
            funding: None,
        }
    }

    /// Enable clustering through a funding fetcher
    pub fn with_funding(mut self, fetcher: Arc<BatchFundingFetcher>) -> Self {
        self.funding = Some(fetcher);
        self
    }

    /// Analyzer wired to on-chain funding lookups over the configured RPC pool
    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = Arc::new(RpcPool::new(&config.rpc)?);
        let provider = Arc::new(OnChainFundingFetcher::new(pool, &config.funding));
        let cache = Arc::new(FundingCache::with_config(config.funding.cache_config()));
        let fetcher = BatchFundingFetcher::new(provider, cache, config.funding.batch_config());

        Ok(Self::new(&config.analysis, config.funding.max_candidates)
            .with_funding(Arc::new(fetcher)))
    }

    pub fn funding(&self) -> Option<&Arc<BatchFundingFetcher>> {
        self.funding.as_ref()
    }

    /// Collect trades and markets from upstream, then [`run`](Self::run)
    pub async fn run_from_sources(
        &self,
        trades: &dyn TradeSource,
        markets: &dyn MarketSource,
        trade_limits: &PageLimits,
        market_limits: &PageLimits,
    ) -> Result<AnalysisReport> {
        let (trades, markets) =
            collect_dataset(trades, markets, trade_limits, market_limits).await?;
        self.run(trades, markets).await
    }

    /// Run the full analysis and return one wallet's record and trades.
    ///
    /// The whole dataset is scored so cluster membership is filled in.
    /// Returns `None` when the wallet has no trades in the dataset.
    pub async fn inspect(
        &self,
        address: &str,
        trades: Vec<Trade>,
        markets: Vec<ResolvedMarket>,
    ) -> Result<Option<WalletDetail>> {
        let index = MarketIndex::new(markets.iter().cloned());
        let Some(annotated) = detail::wallet_trades(address, &trades, &index) else {
            return Ok(None);
        };

        let report = self.run(trades, markets).await?;
        let address = address.to_lowercase();
        let analysis = report.wallet(&address).cloned();
        Ok(Some(WalletDetail {
            address,
            analysis,
            trades: annotated,
        }))
    }

    /// Analyze a trade/market dataset
    pub async fn run(
        &self,
        trades: Vec<Trade>,
        markets: Vec<ResolvedMarket>,
    ) -> Result<AnalysisReport> {
        let mut summary = Summary {
            total_trades: trades.len(),
            total_markets: markets.len(),
            ..Default::default()
        };

        let (valid, rejected): (Vec<Trade>, Vec<Trade>) =
            trades.into_iter().partition(Trade::is_well_formed);
        summary.rejected_trades = rejected.len();
        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Dropped malformed trades");
        }

        let wallets = aggregate_by_wallet(&valid);
        summary.total_wallets = wallets.len();
        let scorable: Vec<Wallet> = wallets.into_iter().filter(Wallet::is_scorable).collect();

        let markets = Arc::new(MarketIndex::new(markets));
        let mut analyses = self.score_wallets(scorable, markets).await?;
        summary.skipped_wallets = summary.total_wallets - analyses.len();
        info!(
            wallets = summary.total_wallets,
            scored = analyses.len(),
            skipped = summary.skipped_wallets,
            "Scored wallets"
        );

        let (clusters, clustering_stats, funding) = self.cluster(&mut analyses).await;
        summary.clustering = clustering_stats;
        summary.funding = funding;

        analyses.sort_by(report::by_p_value);
        report::tally(&mut summary, &analyses);

        let mut top_suspicious = analyses.clone();
        top_suspicious.sort_by(report::by_suspicion);
        top_suspicious.truncate(self.top_suspicious);

        info!(
            flagged = summary.flagged_wallets,
            critical = summary.critical_wallets,
            clusters = clusters.len(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            summary,
            wallets: analyses,
            clusters,
            top_suspicious,
        })
    }

    /// Score wallets in one blocking task per worker
    async fn score_wallets(
        &self,
        wallets: Vec<Wallet>,
        markets: Arc<MarketIndex>,
    ) -> Result<Vec<WalletAnalysis>> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = wallets.len().div_ceil(self.workers);
        let mut handles = Vec::with_capacity(self.workers);
        let mut remaining = wallets.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<Wallet> = remaining.by_ref().take(chunk_size).collect();
            let markets = Arc::clone(&markets);
            handles.push(tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .filter_map(|wallet| analyze_wallet(wallet, &markets))
                    .collect::<Vec<_>>()
            }));
        }
        debug!(workers = handles.len(), chunk_size, "Dispatched scoring");

        let mut analyses = Vec::new();
        for result in join_all(handles).await {
            let scored =
                result.map_err(|e| Error::Internal(format!("Scoring worker failed: {}", e)))?;
            analyses.extend(scored);
        }
        Ok(analyses)
    }

    /// Cluster the flagged wallets and write memberships into `analyses`
    async fn cluster(
        &self,
        analyses: &mut [WalletAnalysis],
    ) -> (Vec<Cluster>, ClusteringStats, Option<FundingSummary>) {
        let Some(fetcher) = &self.funding else {
            return (Vec::new(), ClusteringStats::default(), None);
        };

        let candidates = select_candidates(analyses, self.max_candidates);
        if candidates.is_empty() {
            debug!("No flagged wallets to cluster");
            return (
                Vec::new(),
                ClusteringStats::default(),
                Some(FundingSummary::default()),
            );
        }

        let lookup = fetcher.fetch_all(&candidates).await;
        let clustering = build_clusters(&lookup.sources);
        apply_clustering(analyses, &clustering);

        let stats = clustering.stats();
        (
            clustering.clusters,
            stats,
            Some(FundingSummary::from_lookup(candidates.len(), &lookup)),
        )
    }
}

/// Flagged wallets, most suspicious first, capped at `max`
pub fn select_candidates(analyses: &[WalletAnalysis], max: usize) -> Vec<String> {
    let mut flagged: Vec<&WalletAnalysis> = analyses.iter().filter(|w| w.is_flagged()).collect();
    flagged.sort_by(|a, b| report::by_suspicion(a, b));
    flagged
        .into_iter()
        .take(max)
        .map(|w| w.address.clone())
        .collect()
}

/// Copy cluster memberships onto wallet records; others get the defaults
pub fn apply_clustering(analyses: &mut [WalletAnalysis], clustering: &Clustering) {
    for analysis in analyses.iter_mut() {
        match clustering.membership_of(&analysis.address) {
            Some(member) => {
                analysis.cluster_id = Some(member.cluster_id);
                analysis.cluster_size = member.cluster_size;
                analysis.shared_funding_source = Some(member.shared_funding_source.clone());
            }
            None => analysis.clear_cluster(),
        }
    }
}
