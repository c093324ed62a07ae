//! Recent `OrderFilled` events from the CTF exchange
//!
//! Raw on-chain view of matched orders, used to sanity-check the data API
//! and as a seed for chain-native trade ingestion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::chain::rpc::{LogIndex, LogQuery};

/// Polymarket CTF exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// `OrderFilled` event topic
pub const ORDER_FILLED_TOPIC: &str =
    "0xd0a08e8c493f9c94f29311604c9de1b4e8c8d4c06bd0c789af57f2d65bfec0f6";

/// Upper bound on block timestamp lookups per call
const MAX_TIMESTAMP_LOOKUPS: usize = 100;

/// A filled order seen on-chain
#[derive(Debug, Clone, Serialize)]
pub struct OrderFill {
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// First indexed topic (order hash)
    pub order_hash: Option<String>,
}

/// Fetch fills from the last `block_range` blocks.
///
/// Timestamps are resolved for at most [`MAX_TIMESTAMP_LOOKUPS`] distinct
/// blocks; fills in other blocks keep `timestamp = None`.
pub async fn recent_order_fills(index: &dyn LogIndex, block_range: u64) -> Vec<OrderFill> {
    let Some(head) = index.latest_block().await else {
        return Vec::new();
    };

    let query = LogQuery {
        address: CTF_EXCHANGE.to_string(),
        topics: vec![Some(ORDER_FILLED_TOPIC.to_string())],
        from_block: head.saturating_sub(block_range),
        to_block: None,
    };
    let Some(logs) = index.logs(&query).await else {
        return Vec::new();
    };

    let blocks: BTreeSet<u64> = logs.iter().filter_map(|l| l.block()).collect();
    let mut timestamps = HashMap::new();
    for block in blocks.iter().rev().take(MAX_TIMESTAMP_LOOKUPS) {
        if let Some(ts) = index.block_time(*block).await {
            timestamps.insert(*block, ts);
        }
    }
    debug!(
        fills = logs.len(),
        blocks = blocks.len(),
        timed = timestamps.len(),
        "Fetched order fills"
    );

    logs.into_iter()
        .map(|log| {
            let block_number = log.block();
            OrderFill {
                timestamp: block_number.and_then(|b| timestamps.get(&b).copied()),
                block_number,
                order_hash: log.topics.get(1).cloned(),
                tx_hash: log.transaction_hash,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::Log;
    use async_trait::async_trait;

    struct FakeExchange;

    #[async_trait]
    impl LogIndex for FakeExchange {
        async fn latest_block(&self) -> Option<u64> {
            Some(5_000)
        }

        async fn logs(&self, query: &LogQuery) -> Option<Vec<Log>> {
            assert_eq!(query.from_block, 4_000);
            Some(vec![
                Log {
                    address: CTF_EXCHANGE.to_string(),
                    topics: vec![ORDER_FILLED_TOPIC.to_string(), "0xorder1".to_string()],
                    data: "0x".to_string(),
                    block_number: Some("0x1388".to_string()),
                    transaction_hash: Some("0xtx1".to_string()),
                },
                Log {
                    address: CTF_EXCHANGE.to_string(),
                    topics: vec![ORDER_FILLED_TOPIC.to_string()],
                    data: "0x".to_string(),
                    block_number: None,
                    transaction_hash: Some("0xtx2".to_string()),
                },
            ])
        }

        async fn block_time(&self, block: u64) -> Option<DateTime<Utc>> {
            DateTime::from_timestamp(1_700_000_000 + block as i64, 0)
        }
    }

    #[tokio::test]
    async fn test_recent_order_fills() {
        let fills = recent_order_fills(&FakeExchange, 1_000).await;
        assert_eq!(fills.len(), 2);

        assert_eq!(fills[0].block_number, Some(5_000));
        assert_eq!(fills[0].order_hash.as_deref(), Some("0xorder1"));
        assert_eq!(fills[0].timestamp, DateTime::from_timestamp(1_700_005_000, 0));

        assert!(fills[1].block_number.is_none());
        assert!(fills[1].timestamp.is_none());
    }
}
