//! Single-wallet drilldown

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::outcome::{classify, trade_pnl};
use crate::analysis::{MarketIndex, TradeOutcome, WalletAnalysis};
use crate::source::Trade;

/// A trade annotated with its market's resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTrade {
    pub trade: Trade,
    pub market_question: Option<String>,
    /// Winning outcome label, if the market resolved
    pub market_outcome: Option<String>,
    pub resolution_time: Option<DateTime<Utc>>,
    /// Negative when traded after resolution
    pub minutes_before: Option<f64>,
    pub result: TradeOutcome,
    pub pnl: f64,
}

/// One wallet's score plus its trade history
#[derive(Debug, Clone, Serialize)]
pub struct WalletDetail {
    pub address: String,
    /// None when the wallet has too few trades to score
    pub analysis: Option<WalletAnalysis>,
    /// Newest first
    pub trades: Vec<AnnotatedTrade>,
}

/// Annotate one wallet's well-formed trades, newest first.
///
/// Returns `None` when the wallet has no trades in the dataset.
pub fn wallet_trades(
    address: &str,
    trades: &[Trade],
    markets: &MarketIndex,
) -> Option<Vec<AnnotatedTrade>> {
    let address = address.to_lowercase();
    let mut annotated: Vec<AnnotatedTrade> = trades
        .iter()
        .filter(|t| t.is_well_formed() && t.wallet.to_lowercase() == address)
        .map(|trade| {
            let market = markets.market_for(trade);
            let result = classify(trade, market);
            AnnotatedTrade {
                trade: trade.clone(),
                market_question: market.and_then(|m| m.question.clone()),
                market_outcome: market.and_then(|m| m.outcome.clone()),
                resolution_time: market.and_then(|m| m.resolution_time),
                minutes_before: markets.minutes_before_resolution(trade),
                result,
                pnl: trade_pnl(trade, result),
            }
        })
        .collect();

    if annotated.is_empty() {
        return None;
    }
    annotated.sort_by(|a, b| b.trade.timestamp.cmp(&a.trade.timestamp));
    Some(annotated)
}
