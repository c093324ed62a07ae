//! Trade timing relative to market resolution

use serde::Serialize;

use crate::analysis::MarketIndex;
use crate::source::Trade;

/// Outer edge of the pre-resolution window, in minutes
pub const WINDOW_MINUTES: f64 = 60.0;

/// How close to resolution a wallet tends to trade
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingStats {
    /// Trades matched to a market with a known resolution time
    pub trades_with_timing: usize,
    pub last_minute_trades: usize,
    pub last_10min_trades: usize,
    pub last_hour_trades: usize,
    pub last_minute_ratio: f64,
    pub last_10min_ratio: f64,
    pub last_hour_ratio: f64,
    /// Mean minutes-before over trades inside the window
    pub avg_minutes_before: Option<f64>,
    pub score: u32,
}

/// Bucket trades by minutes before their market resolved.
///
/// Buckets are cumulative. Trades after resolution or more than an hour
/// before it count toward `trades_with_timing` only.
pub fn analyze(trades: &[Trade], markets: &MarketIndex) -> TimingStats {
    let mut stats = TimingStats::default();
    let mut window_minutes = Vec::new();

    for minutes in trades.iter().filter_map(|t| markets.minutes_before_resolution(t)) {
        stats.trades_with_timing += 1;
        if !(0.0..=WINDOW_MINUTES).contains(&minutes) {
            continue;
        }
        window_minutes.push(minutes);
        stats.last_hour_trades += 1;
        if minutes <= 10.0 {
            stats.last_10min_trades += 1;
        }
        if minutes <= 1.0 {
            stats.last_minute_trades += 1;
        }
    }

    if stats.trades_with_timing == 0 {
        return stats;
    }

    let total = stats.trades_with_timing as f64;
    stats.last_minute_ratio = stats.last_minute_trades as f64 / total;
    stats.last_10min_ratio = stats.last_10min_trades as f64 / total;
    stats.last_hour_ratio = stats.last_hour_trades as f64 / total;
    stats.avg_minutes_before = (!window_minutes.is_empty())
        .then(|| window_minutes.iter().sum::<f64>() / window_minutes.len() as f64);
    stats.score = sub_score(
        stats.last_minute_ratio,
        stats.last_10min_ratio,
        stats.last_hour_ratio,
    );
    stats
}

/// Points for the share of trades in each window
pub fn sub_score(last_minute: f64, last_10min: f64, last_hour: f64) -> u32 {
    let mut score = 0;

    if last_minute > 0.3 {
        score += 4;
    } else if last_minute > 0.1 {
        score += 2;
    }

    if last_10min > 0.5 {
        score += 3;
    } else if last_10min > 0.2 {
        score += 1;
    }

    if last_hour > 0.7 {
        score += 2;
    } else if last_hour > 0.4 {
        score += 1;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::{market, t0, trade};
    use crate::source::Side;
    use chrono::Duration;

    fn resolving_in(id: &str, seconds: i64) -> crate::source::ResolvedMarket {
        market(id, Some("Yes"), Some(t0() + Duration::seconds(seconds)))
    }

    #[test]
    fn test_cumulative_buckets() {
        let markets = MarketIndex::new(vec![
            resolving_in("m1", 30),
            resolving_in("m2", 5 * 60),
            resolving_in("m3", 45 * 60),
            resolving_in("m4", 3 * 60 * 60),
            resolving_in("m5", -60),
        ]);
        let trades: Vec<Trade> = (1..=5)
            .map(|i| trade("0xa", &format!("m{}", i), Side::Buy, "Yes", 1.0, 0.5))
            .collect();

        let stats = analyze(&trades, &markets);
        assert_eq!(stats.trades_with_timing, 5);
        assert_eq!(stats.last_minute_trades, 1);
        assert_eq!(stats.last_10min_trades, 2);
        assert_eq!(stats.last_hour_trades, 3);
        assert!((stats.last_hour_ratio - 0.6).abs() < 1e-9);

        // (0.5 + 5 + 45) / 3, out-of-window trades excluded
        let avg = stats.avg_minutes_before.unwrap();
        assert!((avg - 50.5 / 3.0).abs() < 1e-9);

        // 0.2 -> +2, 0.4 -> +1, 0.6 -> +1
        assert_eq!(stats.score, 4);
    }

    #[test]
    fn test_no_timing_data_reports_null_average() {
        let markets = MarketIndex::new(vec![market("m1", Some("Yes"), None)]);
        let trades = vec![trade("0xa", "m1", Side::Buy, "Yes", 1.0, 0.5)];

        let stats = analyze(&trades, &markets);
        assert_eq!(stats, TimingStats::default());
        assert!(stats.avg_minutes_before.is_none());
    }

    #[test]
    fn test_only_out_of_window_trades() {
        let markets = MarketIndex::new(vec![resolving_in("m1", 2 * 60 * 60)]);
        let trades = vec![trade("0xa", "m1", Side::Buy, "Yes", 1.0, 0.5)];

        let stats = analyze(&trades, &markets);
        assert_eq!(stats.trades_with_timing, 1);
        assert_eq!(stats.last_hour_ratio, 0.0);
        assert!(stats.avg_minutes_before.is_none());
        assert_eq!(stats.score, 0);
    }

    #[test]
    fn test_sub_score_maximum() {
        assert_eq!(sub_score(1.0, 1.0, 1.0), 9);
        assert_eq!(sub_score(0.3, 0.5, 0.7), 2 + 1 + 1);
        assert_eq!(sub_score(0.1, 0.2, 0.4), 0);
    }
}
