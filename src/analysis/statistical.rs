//! Win-rate significance
//!
//! Tests a wallet's win count against a fair-coin null with the exact
//! binomial tail. Small trade counts are the interesting case here, so no
//! normal approximation is used.

use serde::Serialize;

use crate::analysis::aggregate::MIN_TRADES;
use crate::analysis::outcome::{classify, trade_pnl};
use crate::analysis::MarketIndex;
use crate::source::Trade;

/// Above this many trades the pmf is evaluated in log space
const DIRECT_PMF_LIMIT: u64 = 1_000;

/// Win/loss statistics for one wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticalScore {
    pub scored_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Trades checked against a known market outcome
    pub verified_trades: usize,
    /// Trades whose result was inferred from price
    pub approximated_trades: usize,
    pub win_rate: f64,
    /// Win rate over verified trades only
    pub resolved_win_rate: Option<f64>,
    /// P(X >= wins) under Binomial(scored_trades, 0.5)
    pub p_value: f64,
    pub total_pnl: f64,
    pub total_stake: f64,
    pub roi: f64,
    pub score: u32,
}

/// Score a wallet's trades. `None` when fewer than [`MIN_TRADES`] trades
/// have a determinable outcome.
pub fn analyze(trades: &[Trade], markets: &MarketIndex) -> Option<StatisticalScore> {
    let mut wins = 0;
    let mut verified_trades = 0;
    let mut verified_wins = 0;
    let mut total_pnl = 0.0;
    let mut total_stake = 0.0;

    for trade in trades {
        let outcome = classify(trade, markets.market_for(trade));
        if outcome.won() {
            wins += 1;
        }
        if outcome.is_verified() {
            verified_trades += 1;
            if outcome.won() {
                verified_wins += 1;
            }
        }
        total_pnl += trade_pnl(trade, outcome);
        total_stake += trade.stake();
    }

    let scored_trades = trades.len();
    if scored_trades < MIN_TRADES {
        return None;
    }

    let win_rate = wins as f64 / scored_trades as f64;
    let p_value = binomial_p_value(wins as u64, scored_trades as u64, 0.5);
    let roi = if total_stake > 0.0 {
        total_pnl / total_stake
    } else {
        0.0
    };
    let resolved_win_rate =
        (verified_trades > 0).then(|| verified_wins as f64 / verified_trades as f64);

    Some(StatisticalScore {
        scored_trades,
        wins,
        losses: scored_trades - wins,
        verified_trades,
        approximated_trades: scored_trades - verified_trades,
        win_rate,
        resolved_win_rate,
        p_value,
        total_pnl,
        total_stake,
        roi,
        score: sub_score(p_value, win_rate, total_stake),
    })
}

/// Points for significance, win rate and stake size
pub fn sub_score(p_value: f64, win_rate: f64, total_stake: f64) -> u32 {
    let significance = if p_value < 1e-4 {
        4
    } else if p_value < 1e-3 {
        3
    } else if p_value < 1e-2 {
        2
    } else if p_value < 5e-2 {
        1
    } else {
        0
    };

    let rate = if win_rate > 0.9 {
        2
    } else if win_rate > 0.8 {
        1
    } else {
        0
    };

    let size = if total_stake > 100_000.0 {
        2
    } else if total_stake > 10_000.0 {
        1
    } else {
        0
    };

    significance + rate + size
}

/// One-sided binomial tail P(X >= wins) for X ~ Binomial(total, p)
pub fn binomial_p_value(wins: u64, total: u64, p: f64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    if wins > total {
        return 0.0;
    }
    // Smallest terms first, so the tail never shrinks as `wins` decreases
    let tail: f64 = (wins..=total).rev().map(|k| binomial_pmf(k, total, p)).sum();
    tail.min(1.0)
}

/// Exact binomial probability mass P(X = k)
pub fn binomial_pmf(k: u64, n: u64, p: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    if p <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if k == n { 1.0 } else { 0.0 };
    }

    let q = 1.0 - p;
    if n <= DIRECT_PMF_LIMIT {
        choose(n, k) * p.powi(k as i32) * q.powi((n - k) as i32)
    } else {
        (ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * q.ln()).exp()
    }
}

/// Binomial coefficient, computed multiplicatively
fn choose(n: u64, k: u64) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn ln_choose(n: u64, k: u64) -> f64 {
    let k = k.min(n - k);
    (0..k)
        .map(|i| ((n - i) as f64).ln() - ((i + 1) as f64).ln())
        .sum()
}
