//! Position-size classification

use serde::Serialize;

use crate::analysis::MarketIndex;
use crate::source::Trade;

/// Single-trade stake above which a trade is whale-sized
pub const WHALE_STAKE: f64 = 5_000.0;
/// Single-trade stake above which a trade is mega-whale-sized
pub const MEGA_WHALE_STAKE: f64 = 25_000.0;
/// Total volume above which a wallet is a whale regardless of trade size
pub const WHALE_VOLUME: f64 = 50_000.0;
/// Whale trades this close to resolution count as pre-resolution
const PRE_RESOLUTION_MINUTES: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WhaleStats {
    pub largest_trade: f64,
    pub whale_trades: usize,
    pub mega_whale_trades: usize,
    pub total_volume: f64,
    pub is_whale: bool,
    pub is_mega_whale: bool,
    /// Whale-sized trades within ten minutes before resolution
    pub pre_resolution_whale_trades: usize,
    pub score: u32,
}

pub fn analyze(trades: &[Trade], markets: &MarketIndex) -> WhaleStats {
    let mut stats = WhaleStats::default();

    for trade in trades {
        let stake = trade.stake();
        stats.total_volume += stake;
        stats.largest_trade = stats.largest_trade.max(stake);

        if stake > MEGA_WHALE_STAKE {
            stats.mega_whale_trades += 1;
        }
        if stake > WHALE_STAKE {
            stats.whale_trades += 1;
            let near_resolution = markets
                .minutes_before_resolution(trade)
                .is_some_and(|m| (0.0..=PRE_RESOLUTION_MINUTES).contains(&m));
            if near_resolution {
                stats.pre_resolution_whale_trades += 1;
            }
        }
    }

    stats.is_whale = stats.total_volume > WHALE_VOLUME || stats.whale_trades > 0;
    stats.is_mega_whale = stats.largest_trade > MEGA_WHALE_STAKE;

    if stats.is_whale {
        stats.score += 1;
    }
    if stats.is_mega_whale {
        stats.score += 2;
    }
    if stats.pre_resolution_whale_trades > 0 {
        stats.score += 3;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::{market, t0, trade};
    use crate::source::Side;
    use chrono::Duration;

    #[test]
    fn test_stake_at_threshold_is_not_whale() {
        let trades = vec![trade("0xa", "m1", Side::Buy, "Yes", 10_000.0, 0.5)];
        let stats = analyze(&trades, &MarketIndex::default());
        assert_eq!(stats.largest_trade, WHALE_STAKE);
        assert_eq!(stats.whale_trades, 0);
        assert!(!stats.is_whale);
        assert_eq!(stats.score, 0);
    }

    #[test]
    fn test_mega_whale_near_resolution() {
        let markets = MarketIndex::new(vec![market(
            "m1",
            Some("Yes"),
            Some(t0() + Duration::minutes(5)),
        )]);
        let trades = vec![
            trade("0xa", "m1", Side::Buy, "Yes", 100_000.0, 0.3),
            trade("0xa", "m2", Side::Buy, "Yes", 100.0, 0.3),
        ];

        let stats = analyze(&trades, &markets);
        assert_eq!(stats.whale_trades, 1);
        assert_eq!(stats.mega_whale_trades, 1);
        assert_eq!(stats.pre_resolution_whale_trades, 1);
        assert!(stats.is_whale && stats.is_mega_whale);
        assert_eq!(stats.score, 6);
    }

    #[test]
    fn test_volume_alone_makes_whale() {
        let trades: Vec<Trade> = (0..20)
            .map(|i| trade("0xa", &format!("m{}", i), Side::Buy, "Yes", 6_000.0, 0.5))
            .collect();
        let stats = analyze(&trades, &MarketIndex::default());
        assert_eq!(stats.whale_trades, 0);
        assert!((stats.total_volume - 60_000.0).abs() < 1e-9);
        assert!(stats.is_whale);
        assert!(!stats.is_mega_whale);
        assert_eq!(stats.score, 1);
    }
}
