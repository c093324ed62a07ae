//! Profitability spread across markets
//!
//! One lucky market says little. Consistent gains across many unrelated
//! markets is the stronger signal, so this analyzer scores breadth.

use serde::Serialize;
use std::collections::HashMap;

use crate::source::{Side, Trade};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossMarketStats {
    pub unique_markets: usize,
    /// Markets with positive price-based PnL
    pub winning_markets: usize,
    pub win_rate: f64,
    pub score: u32,
}

/// Price-based PnL of a trade against an even-odds entry
fn edge_pnl(trade: &Trade) -> f64 {
    match trade.side {
        Side::Buy => trade.amount * (0.5 - trade.price),
        Side::Sell => trade.amount * (trade.price - 0.5),
    }
}

pub fn analyze(trades: &[Trade]) -> CrossMarketStats {
    let mut by_market: HashMap<String, f64> = HashMap::new();
    for trade in trades {
        *by_market.entry(trade.market_id.to_lowercase()).or_default() += edge_pnl(trade);
    }

    let unique_markets = by_market.len();
    let winning_markets = by_market.values().filter(|pnl| **pnl > 0.0).count();
    let win_rate = if unique_markets > 0 {
        winning_markets as f64 / unique_markets as f64
    } else {
        0.0
    };

    CrossMarketStats {
        unique_markets,
        winning_markets,
        win_rate,
        score: sub_score(winning_markets, win_rate),
    }
}

/// +2 for five winning markets above 70%, +3 for ten above 60%; additive
pub fn sub_score(winning_markets: usize, win_rate: f64) -> u32 {
    let mut score = 0;
    if winning_markets >= 5 && win_rate > 0.7 {
        score += 2;
    }
    if winning_markets >= 10 && win_rate > 0.6 {
        score += 3;
    }
    score
}
