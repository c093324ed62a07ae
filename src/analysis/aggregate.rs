//! Per-wallet trade aggregation

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::source::Trade;

/// Minimum trades before a wallet is scored
pub const MIN_TRADES: usize = 3;

/// All trades of one wallet
#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    /// Lowercase address
    pub address: String,
    pub trades: Vec<Trade>,
    /// Sum of amount x price over all trades
    pub total_volume: f64,
    /// Display names seen on this wallet's trades
    pub pseudonyms: Vec<String>,
}

impl Wallet {
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Enough trades to be worth scoring
    pub fn is_scorable(&self) -> bool {
        self.trades.len() >= MIN_TRADES
    }

    /// Distinct markets traded
    pub fn unique_markets(&self) -> usize {
        self.trades
            .iter()
            .map(|t| t.market_id.to_lowercase())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Group trades by (case-normalized) wallet address.
///
/// Wallets come back sorted by address. Trades without a wallet are dropped.
pub fn aggregate_by_wallet(trades: &[Trade]) -> Vec<Wallet> {
    let mut grouped: BTreeMap<String, (Vec<Trade>, f64, BTreeSet<String>)> = BTreeMap::new();

    for trade in trades {
        if trade.wallet.is_empty() {
            continue;
        }
        let (wallet_trades, volume, names) = grouped
            .entry(trade.wallet.to_lowercase())
            .or_insert_with(|| (Vec::new(), 0.0, BTreeSet::new()));
        wallet_trades.push(trade.clone());
        *volume += trade.stake();
        if let Some(name) = &trade.pseudonym {
            names.insert(name.clone());
        }
    }

    grouped
        .into_iter()
        .map(|(address, (trades, total_volume, names))| Wallet {
            address,
            trades,
            total_volume,
            pseudonyms: names.into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::trade;
    use crate::source::Side;

    #[test]
    fn test_groups_case_insensitively() {
        let mut named = trade("0xAB", "m2", Side::Sell, "No", 20.0, 0.5);
        named.pseudonym = Some("whale-watcher".to_string());
        let trades = vec![
            trade("0xab", "m1", Side::Buy, "Yes", 10.0, 0.2),
            named,
            trade("0xcd", "m1", Side::Buy, "Yes", 5.0, 0.4),
            trade("", "m1", Side::Buy, "Yes", 5.0, 0.4),
        ];

        let wallets = aggregate_by_wallet(&trades);
        assert_eq!(wallets.len(), 2);

        let ab = &wallets[0];
        assert_eq!(ab.address, "0xab");
        assert_eq!(ab.trade_count(), 2);
        assert!((ab.total_volume - 12.0).abs() < 1e-9);
        assert_eq!(ab.pseudonyms, vec!["whale-watcher".to_string()]);
        assert_eq!(ab.unique_markets(), 2);

        assert_eq!(wallets[1].address, "0xcd");
    }

    #[test]
    fn test_unique_markets_ignores_id_case() {
        let trades = vec![
            trade("0xa", "0xMarket", Side::Buy, "Yes", 1.0, 0.5),
            trade("0xa", "0xmarket", Side::Buy, "Yes", 1.0, 0.5),
            trade("0xa", "0xother", Side::Buy, "Yes", 1.0, 0.5),
        ];
        let wallets = aggregate_by_wallet(&trades);
        assert_eq!(wallets[0].unique_markets(), 2);
    }

    #[test]
    fn test_scorable_threshold() {
        let trades: Vec<Trade> = (0..MIN_TRADES)
            .map(|i| trade("0xa", &format!("m{}", i), Side::Buy, "Yes", 1.0, 0.5))
            .collect();
        let wallets = aggregate_by_wallet(&trades);
        assert!(wallets[0].is_scorable());

        let wallets = aggregate_by_wallet(&trades[..MIN_TRADES - 1]);
        assert!(!wallets[0].is_scorable());
    }
}
