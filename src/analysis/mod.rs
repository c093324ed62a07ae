//! Per-wallet insider-signal analysis
//!
//! Each analyzer is a pure function over one wallet's trades and the
//! resolved-market index:
//! - [`statistical`]: win/loss accounting and binomial p-value
//! - [`timing`]: proximity of trades to market resolution
//! - [`cross_market`]: profitability spread across markets
//! - [`whale`]: position size
//!
//! [`composite`] sums their sub-scores into a suspicion level.

use std::collections::HashMap;

use crate::source::{ResolvedMarket, Trade};

pub mod aggregate;
pub mod composite;
pub mod cross_market;
pub mod outcome;
pub mod statistical;
pub mod timing;
pub mod whale;

pub use aggregate::{aggregate_by_wallet, Wallet, MIN_TRADES};
pub use composite::{analyze_wallet, SubScores, SuspicionLevel, WalletAnalysis};
pub use outcome::TradeOutcome;

/// Resolved markets keyed by (lowercase) market id
#[derive(Debug, Clone, Default)]
pub struct MarketIndex {
    markets: HashMap<String, ResolvedMarket>,
}

impl MarketIndex {
    pub fn new(markets: impl IntoIterator<Item = ResolvedMarket>) -> Self {
        let markets = markets
            .into_iter()
            .map(|m| (m.id.to_lowercase(), m))
            .collect();
        Self { markets }
    }

    pub fn get(&self, market_id: &str) -> Option<&ResolvedMarket> {
        self.markets.get(&market_id.to_lowercase())
    }

    /// Market a trade was placed on, if known
    pub fn market_for(&self, trade: &Trade) -> Option<&ResolvedMarket> {
        self.get(&trade.market_id)
    }

    /// Minutes between a trade and its market's resolution.
    ///
    /// Negative when the trade happened after resolution. `None` when the
    /// market or its resolution time is unknown.
    pub fn minutes_before_resolution(&self, trade: &Trade) -> Option<f64> {
        let resolved_at = self.market_for(trade)?.resolution_time?;
        let delta = resolved_at - trade.timestamp;
        Some(delta.num_milliseconds() as f64 / 60_000.0)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
