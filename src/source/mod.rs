//! Trade and market ingestion
//!
//! Upstream APIs hand back loosely-typed records. Everything is normalized
//! at this boundary into strict [`Trade`] and [`ResolvedMarket`] values;
//! records that cannot be normalized are skipped and counted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

pub mod polymarket;

pub use polymarket::PolymarketClient;

/// Side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse an upstream side label ("BUY", "sell", ...)
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// A single normalized trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trader wallet, lowercase
    pub wallet: String,
    /// Market / condition id
    pub market_id: String,
    pub side: Side,
    /// Outcome label the trade was placed on ("Yes", "No", ...)
    pub outcome: String,
    /// Position size in shares
    pub amount: f64,
    /// Implied probability, 0.0 to 1.0
    pub price: f64,
    pub timestamp: DateTime<Utc>,

    // Display fields
    #[serde(default)]
    pub market_title: Option<String>,
    #[serde(default)]
    pub market_slug: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub pseudonym: Option<String>,
}

impl Trade {
    /// Notional stake (amount x price)
    pub fn stake(&self) -> f64 {
        self.amount * self.price
    }

    /// Check the invariants a trade must satisfy to be analyzed
    pub fn is_well_formed(&self) -> bool {
        !self.wallet.is_empty()
            && !self.market_id.is_empty()
            && !self.outcome.trim().is_empty()
            && self.amount.is_finite()
            && self.amount > 0.0
            && self.price.is_finite()
            && (0.0..=1.0).contains(&self.price)
    }
}

/// A closed market with its resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMarket {
    /// Market / condition id
    pub id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    /// When the market resolved (None if unknown)
    pub resolution_time: Option<DateTime<Utc>>,
    /// Winning outcome label (None if not yet resolved)
    pub outcome: Option<String>,
    #[serde(default)]
    pub volume: f64,
}

/// One page of normalized records.
///
/// `raw_len` is the number of records the upstream returned before
/// normalization; paging decisions are made on it so that skipped records
/// never look like the end of the stream.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub raw_len: usize,
}

impl<T> Page<T> {
    /// A page where every upstream record survived normalization
    pub fn complete(records: Vec<T>) -> Self {
        let raw_len = records.len();
        Self { records, raw_len }
    }
}

/// Paging limits shared by the trade and market collectors
#[derive(Debug, Clone)]
pub struct PageLimits {
    /// Records requested per page
    pub page_size: usize,
    /// Stop after collecting this many records
    pub max_records: usize,
    /// Pause between page requests
    pub page_delay: Duration,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_records: 5_000,
            page_delay: Duration::from_millis(50),
        }
    }
}

/// Paginated source of trades
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Fetch one page of trades starting at `offset`
    async fn fetch_trades(&self, offset: usize, limit: usize) -> Result<Page<Trade>>;
}

/// Paginated source of resolved markets
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch one page of closed markets starting at `offset`
    async fn fetch_resolved_markets(&self, offset: usize, limit: usize)
        -> Result<Page<ResolvedMarket>>;
}

/// Drive a paginated fetcher until an empty page, a short page, or the
/// record limit. Errors from any page abort the whole collection.
pub async fn collect_pages<T, F, Fut>(limits: &PageLimits, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>>>,
{
    let page_size = limits.page_size.max(1);
    let mut records = Vec::new();
    let mut offset = 0;

    while records.len() < limits.max_records {
        let page = fetch_page(offset, page_size).await?;
        let fetched = page.raw_len;
        if fetched == 0 {
            break;
        }

        records.extend(page.records);
        offset += fetched;
        debug!(fetched, total = records.len(), "Collected page");

        if fetched < page_size {
            break;
        }
        if !limits.page_delay.is_zero() && records.len() < limits.max_records {
            tokio::time::sleep(limits.page_delay).await;
        }
    }

    records.truncate(limits.max_records);
    Ok(records)
}

/// Collect every trade page from a source
pub async fn collect_trades(source: &dyn TradeSource, limits: &PageLimits) -> Result<Vec<Trade>> {
    collect_pages(limits, |offset, limit| source.fetch_trades(offset, limit)).await
}

/// Collect every resolved-market page from a source
pub async fn collect_markets(
    source: &dyn MarketSource,
    limits: &PageLimits,
) -> Result<Vec<ResolvedMarket>> {
    collect_pages(limits, |offset, limit| {
        source.fetch_resolved_markets(offset, limit)
    })
    .await
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// Fixed reference time for tests
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 5, 12, 0, 0).unwrap()
    }

    pub fn trade(wallet: &str, market: &str, side: Side, outcome: &str, amount: f64, price: f64) -> Trade {
        Trade {
            wallet: wallet.to_string(),
            market_id: market.to_string(),
            side,
            outcome: outcome.to_string(),
            amount,
            price,
            timestamp: t0(),
            market_title: None,
            market_slug: None,
            tx_hash: None,
            pseudonym: None,
        }
    }

    pub fn market(id: &str, outcome: Option<&str>, resolution: Option<DateTime<Utc>>) -> ResolvedMarket {
        ResolvedMarket {
            id: id.to_string(),
            question: None,
            slug: None,
            resolution_time: resolution,
            outcome: outcome.map(str::to_string),
            volume: 0.0,
        }
    }
}
