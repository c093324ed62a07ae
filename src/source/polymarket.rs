//! Polymarket public API client
//!
//! Trades come from the data API, resolved markets from the gamma API.
//! Both endpoints are offset-paginated; the collectors in the parent module
//! drive the paging.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::source::{MarketSource, Page, ResolvedMarket, Side, Trade, TradeSource};

/// Outcome price above which an outcome counts as the winner
const WINNING_PRICE: f64 = 0.99;

/// Raw trade record from the data API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub proxy_wallet: Option<String>,
    pub condition_id: Option<String>,
    pub side: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub timestamp: Option<f64>,
    pub outcome: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub transaction_hash: Option<String>,
    pub pseudonym: Option<String>,
    pub name: Option<String>,
}

/// Raw market record from the gamma API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    pub id: Option<String>,
    pub condition_id: Option<String>,
    pub question: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub closed: bool,
    pub closed_time: Option<String>,
    pub end_date: Option<String>,
    /// JSON-encoded list of outcome labels
    pub outcomes: Option<String>,
    /// JSON-encoded list of outcome prices (as strings)
    pub outcome_prices: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub volume_num: Option<f64>,
}

/// Accept numbers encoded either as JSON numbers or strings
fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl RawTrade {
    /// Normalize into a strict [`Trade`], or explain why it was rejected
    pub fn normalize(self) -> Result<Trade> {
        let wallet = self
            .proxy_wallet
            .filter(|w| !w.is_empty())
            .ok_or_else(|| Error::MalformedRecord("trade without wallet".into()))?
            .to_lowercase();
        let market_id = self
            .condition_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::MalformedRecord("trade without condition id".into()))?;
        let side = self
            .side
            .as_deref()
            .and_then(Side::parse)
            .ok_or_else(|| Error::MalformedRecord(format!("unknown side {:?}", self.side)))?;
        let outcome = self
            .outcome
            .filter(|o| !o.is_empty())
            .ok_or_else(|| Error::MalformedRecord("trade without outcome label".into()))?;
        let amount = self
            .size
            .ok_or_else(|| Error::MalformedRecord("trade without size".into()))?;
        let price = self
            .price
            .ok_or_else(|| Error::MalformedRecord("trade without price".into()))?;
        let timestamp = self
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
            .ok_or_else(|| Error::MalformedRecord("trade without timestamp".into()))?;

        let trade = Trade {
            wallet,
            market_id,
            side,
            outcome,
            amount,
            price,
            timestamp,
            market_title: self.title,
            market_slug: self.slug,
            tx_hash: self.transaction_hash,
            pseudonym: self.pseudonym.or(self.name),
        };

        if !trade.is_well_formed() {
            return Err(Error::MalformedRecord(format!(
                "trade out of range: amount={} price={}",
                trade.amount, trade.price
            )));
        }
        Ok(trade)
    }
}

impl RawMarket {
    /// Normalize a closed market. Open markets are rejected.
    pub fn normalize(self) -> Result<ResolvedMarket> {
        if !self.closed {
            return Err(Error::MalformedRecord("market is not closed".into()));
        }
        let id = self
            .condition_id
            .filter(|c| !c.is_empty())
            .or(self.id)
            .ok_or_else(|| Error::MalformedRecord("market without id".into()))?;

        let outcome = winning_outcome(self.outcomes.as_deref(), self.outcome_prices.as_deref());
        let resolution_time = self
            .closed_time
            .as_deref()
            .and_then(parse_time)
            .or_else(|| self.end_date.as_deref().and_then(parse_time));

        Ok(ResolvedMarket {
            id,
            question: self.question,
            slug: self.slug,
            resolution_time,
            outcome,
            volume: self.volume_num.unwrap_or(0.0),
        })
    }
}

/// Pick the outcome whose settlement price reached ~1.0
fn winning_outcome(outcomes: Option<&str>, prices: Option<&str>) -> Option<String> {
    let prices: Vec<String> = serde_json::from_str(prices?).ok()?;
    let labels: Vec<String> = outcomes
        .and_then(|o| serde_json::from_str(o).ok())
        .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]);

    prices
        .iter()
        .position(|p| p.trim().parse::<f64>().map(|v| v > WINNING_PRICE).unwrap_or(false))
        .and_then(|idx| labels.get(idx).cloned())
}

/// Parse the timestamp shapes the gamma API emits
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // "2024-11-06 04:02:11+00"
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%#z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Polymarket API client
pub struct PolymarketClient {
    client: Client,
    data_api_url: String,
    gamma_api_url: String,
    order_by_volume: bool,
    retry_budget: Duration,
}

impl PolymarketClient {
    /// Create a client from source configuration
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            data_api_url: config.data_api_url.trim_end_matches('/').to_string(),
            gamma_api_url: config.gamma_api_url.trim_end_matches('/').to_string(),
            order_by_volume: config.order_markets_by_volume,
            retry_budget: Duration::from_millis(config.retry_budget_ms),
        })
    }

    /// GET a JSON payload, retrying transient failures
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        };

        retry(backoff, || async {
            match self.get_json_once(url).await {
                Ok(payload) => Ok(payload),
                Err(e) if e.is_retryable() => {
                    warn!(url = %url, error = %e, "Retryable upstream error");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Single GET attempt
    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse {}: {}", url, e)))
    }
}

#[async_trait]
impl TradeSource for PolymarketClient {
    async fn fetch_trades(&self, offset: usize, limit: usize) -> Result<Page<Trade>> {
        let url = format!(
            "{}/trades?limit={}&offset={}",
            self.data_api_url, limit, offset
        );
        let raw: Vec<RawTrade> = self.get_json(&url).await?;
        let raw_len = raw.len();

        let mut trades = Vec::with_capacity(raw_len);
        for record in raw {
            match record.normalize() {
                Ok(trade) => trades.push(trade),
                Err(e) => debug!(error = %e, "Skipping trade record"),
            }
        }
        if trades.len() < raw_len {
            debug!(raw_len, kept = trades.len(), offset, "Dropped malformed trades");
        }
        Ok(Page { records: trades, raw_len })
    }
}

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn fetch_resolved_markets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ResolvedMarket>> {
        let mut url = format!(
            "{}/markets?closed=true&limit={}&offset={}",
            self.gamma_api_url, limit, offset
        );
        if self.order_by_volume {
            url.push_str("&order=volumeNum&ascending=false");
        }
        let raw: Vec<RawMarket> = self.get_json(&url).await?;
        let raw_len = raw.len();

        let markets: Vec<ResolvedMarket> = raw
            .into_iter()
            .filter_map(|m| match m.normalize() {
                Ok(market) => Some(market),
                Err(e) => {
                    debug!(error = %e, "Skipping market record");
                    None
                }
            })
            .collect();
        Ok(Page { records: markets, raw_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_trade() {
        let raw: RawTrade = serde_json::from_value(serde_json::json!({
            "proxyWallet": "0xABCDEF0000000000000000000000000000000001",
            "conditionId": "0xcond",
            "side": "BUY",
            "size": "120.5",
            "price": 0.42,
            "timestamp": 1730808000,
            "outcome": "Yes",
            "title": "Will it rain?",
            "name": "rainman"
        }))
        .unwrap();

        let trade = raw.normalize().unwrap();
        assert_eq!(trade.wallet, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(trade.side, Side::Buy);
        assert!((trade.amount - 120.5).abs() < 1e-9);
        assert_eq!(trade.timestamp, Utc.timestamp_opt(1730808000, 0).unwrap());
        assert_eq!(trade.pseudonym.as_deref(), Some("rainman"));
    }

    #[test]
    fn test_normalize_trade_rejects_bad_records() {
        let missing_wallet: RawTrade = serde_json::from_value(serde_json::json!({
            "conditionId": "0xcond", "side": "BUY", "size": 1, "price": 0.5,
            "timestamp": 1730808000, "outcome": "Yes"
        }))
        .unwrap();
        assert!(matches!(missing_wallet.normalize(), Err(Error::MalformedRecord(_))));

        let bad_price: RawTrade = serde_json::from_value(serde_json::json!({
            "proxyWallet": "0xa", "conditionId": "0xcond", "side": "SELL", "size": 1,
            "price": 3.0, "timestamp": 1730808000, "outcome": "No"
        }))
        .unwrap();
        assert!(bad_price.normalize().is_err());
    }

    #[test]
    fn test_normalize_market_winner() {
        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "id": "517310",
            "conditionId": "0xcond",
            "question": "Will it rain?",
            "closed": true,
            "closedTime": "2024-11-06 04:02:11+00",
            "outcomes": "[\"Up\", \"Down\"]",
            "outcomePrices": "[\"0\", \"1\"]",
            "volumeNum": 1234.5
        }))
        .unwrap();

        let market = raw.normalize().unwrap();
        assert_eq!(market.id, "0xcond");
        assert_eq!(market.outcome.as_deref(), Some("Down"));
        assert_eq!(
            market.resolution_time,
            Some(Utc.with_ymd_and_hms(2024, 11, 6, 4, 2, 11).unwrap())
        );
        assert!((market.volume - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_market_unresolved_and_open() {
        let unresolved: RawMarket = serde_json::from_value(serde_json::json!({
            "id": "1", "closed": true, "endDate": "2024-11-05T12:00:00Z",
            "outcomePrices": "[\"0.5\", \"0.5\"]"
        }))
        .unwrap();
        let market = unresolved.normalize().unwrap();
        assert_eq!(market.id, "1");
        assert!(market.outcome.is_none());
        assert!(market.resolution_time.is_some());

        let open: RawMarket =
            serde_json::from_value(serde_json::json!({ "id": "2", "closed": false })).unwrap();
        assert!(open.normalize().is_err());
    }

    #[test]
    fn test_winning_outcome_defaults_to_yes_no() {
        assert_eq!(winning_outcome(None, Some("[\"1\", \"0\"]")).as_deref(), Some("Yes"));
        assert_eq!(winning_outcome(None, None), None);
    }
}
