//! Composite suspicion score and per-wallet result

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::aggregate::Wallet;
use crate::analysis::cross_market::{self, CrossMarketStats};
use crate::analysis::timing::{self, TimingStats};
use crate::analysis::whale::{self, WhaleStats};
use crate::analysis::{statistical, MarketIndex};

/// Suspicion level derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspicionLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SuspicionLevel {
    /// Classify a score. Boundaries are inclusive: 8 is critical, 5 high,
    /// 3 medium.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 8 => SuspicionLevel::Critical,
            s if s >= 5 => SuspicionLevel::High,
            s if s >= 3 => SuspicionLevel::Medium,
            _ => SuspicionLevel::Low,
        }
    }

    /// Anything above low is flagged
    pub fn is_flagged(&self) -> bool {
        *self != SuspicionLevel::Low
    }
}

impl fmt::Display for SuspicionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspicionLevel::Low => write!(f, "low"),
            SuspicionLevel::Medium => write!(f, "medium"),
            SuspicionLevel::High => write!(f, "high"),
            SuspicionLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Points contributed by each analyzer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubScores {
    pub statistical: u32,
    pub timing: u32,
    pub cross_market: u32,
    pub whale: u32,
}

impl SubScores {
    /// Unweighted sum
    pub fn total(&self) -> u32 {
        self.statistical + self.timing + self.cross_market + self.whale
    }
}

/// Full analysis of one wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletAnalysis {
    pub address: String,
    pub pseudonyms: Vec<String>,
    pub trade_count: usize,
    pub unique_markets: usize,
    pub total_volume: f64,

    // Win/loss
    pub scored_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub verified_trades: usize,
    pub approximated_trades: usize,
    pub win_rate: f64,
    pub resolved_win_rate: Option<f64>,
    pub p_value: f64,
    pub total_pnl: f64,
    pub total_stake: f64,
    pub roi: f64,

    pub timing: TimingStats,
    pub cross_market: CrossMarketStats,
    pub whale: WhaleStats,

    pub sub_scores: SubScores,
    pub suspicion_score: u32,
    pub suspicion_level: SuspicionLevel,

    // Filled after clustering
    pub cluster_id: Option<u32>,
    pub cluster_size: usize,
    pub shared_funding_source: Option<String>,
}

impl WalletAnalysis {
    pub fn is_flagged(&self) -> bool {
        self.suspicion_level.is_flagged()
    }

    /// Drop any cluster assignment
    pub fn clear_cluster(&mut self) {
        self.cluster_id = None;
        self.cluster_size = 1;
        self.shared_funding_source = None;
    }
}

/// Run every analyzer over one wallet.
///
/// Returns `None` for wallets without enough scorable trades.
pub fn analyze_wallet(wallet: &Wallet, markets: &MarketIndex) -> Option<WalletAnalysis> {
    let stats = statistical::analyze(&wallet.trades, markets)?;
    let timing = timing::analyze(&wallet.trades, markets);
    let cross_market = cross_market::analyze(&wallet.trades);
    let whale = whale::analyze(&wallet.trades, markets);

    let sub_scores = SubScores {
        statistical: stats.score,
        timing: timing.score,
        cross_market: cross_market.score,
        whale: whale.score,
    };
    let suspicion_score = sub_scores.total();

    Some(WalletAnalysis {
        address: wallet.address.clone(),
        pseudonyms: wallet.pseudonyms.clone(),
        trade_count: wallet.trade_count(),
        unique_markets: wallet.unique_markets(),
        total_volume: wallet.total_volume,
        scored_trades: stats.scored_trades,
        wins: stats.wins,
        losses: stats.losses,
        verified_trades: stats.verified_trades,
        approximated_trades: stats.approximated_trades,
        win_rate: stats.win_rate,
        resolved_win_rate: stats.resolved_win_rate,
        p_value: stats.p_value,
        total_pnl: stats.total_pnl,
        total_stake: stats.total_stake,
        roi: stats.roi,
        timing,
        cross_market,
        whale,
        sub_scores,
        suspicion_score,
        suspicion_level: SuspicionLevel::from_score(suspicion_score),
        cluster_id: None,
        cluster_size: 1,
        shared_funding_source: None,
    })
}
