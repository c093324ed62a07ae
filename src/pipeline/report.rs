//! Assembled output of an analysis run

use serde::Serialize;
use std::cmp::Ordering;

use crate::analysis::{SuspicionLevel, WalletAnalysis};
use crate::chain::FundingLookup;
use crate::cluster::{Cluster, ClusteringStats};

/// Funding-stage accounting
#[derive(Debug, Clone, Default, Serialize)]
pub struct FundingSummary {
    pub candidates: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed: usize,
}

impl FundingSummary {
    pub fn from_lookup(candidates: usize, lookup: &FundingLookup) -> Self {
        Self {
            candidates,
            cache_hits: lookup.cache_hits,
            fetched: lookup.fetched,
            failed: lookup.failed,
        }
    }
}

/// Run-level aggregates
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total_trades: usize,
    /// Trades dropped for failing basic validation
    pub rejected_trades: usize,
    pub total_markets: usize,
    pub total_wallets: usize,
    pub scored_wallets: usize,
    /// Wallets with too few scorable trades
    pub skipped_wallets: usize,
    pub flagged_wallets: usize,
    pub critical_wallets: usize,
    pub high_wallets: usize,
    pub medium_wallets: usize,
    /// Total stake across scored wallets
    pub total_volume: f64,
    /// Stake of flagged wallets
    pub suspicious_volume: f64,
    pub suspicious_volume_percent: f64,
    pub clustering: ClusteringStats,
    /// None when clustering did not run
    pub funding: Option<FundingSummary>,
}

/// Everything a run produces
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub summary: Summary,
    /// Sorted by p-value, most significant first
    pub wallets: Vec<WalletAnalysis>,
    pub clusters: Vec<Cluster>,
    /// Highest suspicion scores
    pub top_suspicious: Vec<WalletAnalysis>,
}

impl AnalysisReport {
    pub fn wallet(&self, address: &str) -> Option<&WalletAnalysis> {
        let address = address.to_lowercase();
        self.wallets.iter().find(|w| w.address == address)
    }
}

/// Ascending p-value; address breaks ties
pub fn by_p_value(a: &WalletAnalysis, b: &WalletAnalysis) -> Ordering {
    a.p_value
        .total_cmp(&b.p_value)
        .then_with(|| a.address.cmp(&b.address))
}

/// Descending score, then ascending p-value
pub fn by_suspicion(a: &WalletAnalysis, b: &WalletAnalysis) -> Ordering {
    b.suspicion_score
        .cmp(&a.suspicion_score)
        .then_with(|| by_p_value(a, b))
}

/// Level counts and volumes over scored wallets
pub fn tally(summary: &mut Summary, wallets: &[WalletAnalysis]) {
    summary.scored_wallets = wallets.len();
    for wallet in wallets {
        summary.total_volume += wallet.total_stake;
        match wallet.suspicion_level {
            SuspicionLevel::Critical => summary.critical_wallets += 1,
            SuspicionLevel::High => summary.high_wallets += 1,
            SuspicionLevel::Medium => summary.medium_wallets += 1,
            SuspicionLevel::Low => continue,
        }
        summary.flagged_wallets += 1;
        summary.suspicious_volume += wallet.total_stake;
    }
    summary.suspicious_volume_percent = if summary.total_volume > 0.0 {
        summary.suspicious_volume / summary.total_volume * 100.0
    } else {
        0.0
    };
}
