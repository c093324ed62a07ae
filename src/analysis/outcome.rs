//! Win/loss determination for a single trade
//!
//! A trade's result is verified when its market has a known winning
//! outcome. Otherwise it is approximated from the entry price alone, which
//! is a proxy and never ground truth; the two cases stay distinct so
//! reports can separate verified from estimated figures.

use serde::Serialize;

use crate::source::{ResolvedMarket, Side, Trade};

/// Result of a trade and how it was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Checked against the market's winning outcome
    Resolved { won: bool },
    /// Inferred from price: buys below 0.5 and sells above 0.5 count as wins
    Approximated { won: bool },
}

impl TradeOutcome {
    pub fn won(&self) -> bool {
        match self {
            TradeOutcome::Resolved { won } | TradeOutcome::Approximated { won } => *won,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, TradeOutcome::Resolved { .. })
    }
}

/// Determine whether a trade won
pub fn classify(trade: &Trade, market: Option<&ResolvedMarket>) -> TradeOutcome {
    match market.and_then(|m| m.outcome.as_deref()) {
        Some(winner) => {
            let picked_winner = trade.outcome.trim().eq_ignore_ascii_case(winner.trim());
            let won = match trade.side {
                Side::Buy => picked_winner,
                Side::Sell => !picked_winner,
            };
            TradeOutcome::Resolved { won }
        }
        None => {
            let won = match trade.side {
                Side::Buy => trade.price < 0.5,
                Side::Sell => trade.price > 0.5,
            };
            TradeOutcome::Approximated { won }
        }
    }
}

/// Realized PnL of a trade given its outcome: a winning share pays 1.0
pub fn trade_pnl(trade: &Trade, outcome: TradeOutcome) -> f64 {
    if outcome.won() {
        trade.amount * (1.0 - trade.price)
    } else {
        -trade.amount * trade.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::{market, trade};

    #[test]
    fn test_resolved_buy_and_sell() {
        let resolved = market("m1", Some("YES"), None);

        let buy_yes = trade("0xa", "m1", Side::Buy, "Yes", 10.0, 0.7);
        assert_eq!(classify(&buy_yes, Some(&resolved)), TradeOutcome::Resolved { won: true });

        let buy_no = trade("0xa", "m1", Side::Buy, "No", 10.0, 0.3);
        assert_eq!(classify(&buy_no, Some(&resolved)), TradeOutcome::Resolved { won: false });

        let sell_no = trade("0xa", "m1", Side::Sell, "No", 10.0, 0.3);
        assert_eq!(classify(&sell_no, Some(&resolved)), TradeOutcome::Resolved { won: true });

        let sell_yes = trade("0xa", "m1", Side::Sell, "Yes", 10.0, 0.3);
        assert_eq!(classify(&sell_yes, Some(&resolved)), TradeOutcome::Resolved { won: false });
    }

    #[test]
    fn test_price_approximation_without_resolution() {
        let unresolved = market("m1", None, None);

        let cheap_buy = trade("0xa", "m1", Side::Buy, "Yes", 10.0, 0.2);
        let outcome = classify(&cheap_buy, Some(&unresolved));
        assert_eq!(outcome, TradeOutcome::Approximated { won: true });
        assert!(!outcome.is_verified());

        let even_buy = trade("0xa", "m1", Side::Buy, "Yes", 10.0, 0.5);
        assert!(!classify(&even_buy, None).won());

        let rich_sell = trade("0xa", "m1", Side::Sell, "Yes", 10.0, 0.8);
        assert!(classify(&rich_sell, None).won());
    }

    #[test]
    fn test_trade_pnl() {
        let t = trade("0xa", "m1", Side::Buy, "Yes", 100.0, 0.25);
        assert!((trade_pnl(&t, TradeOutcome::Resolved { won: true }) - 75.0).abs() < 1e-9);
        assert!((trade_pnl(&t, TradeOutcome::Resolved { won: false }) + 25.0).abs() < 1e-9);
    }
}
