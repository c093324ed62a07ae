//! Funding source discovery
//!
//! A wallet's funding sources are the senders of settlement-token
//! `Transfer` events into it over a look-back block window, summed per
//! sender. Sybil operators typically fund many trading wallets from one
//! treasury, which the cluster builder turns into linkage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::chain::rpc::{address_to_topic, parse_hex_u128, topic_to_address, Log, LogIndex, LogQuery};
use crate::config::FundingConfig;
use crate::error::{Error, Result};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Cumulative transfers from one sender into a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSource {
    /// Sender address, lowercase
    pub address: String,
    /// Total transferred, in token units
    pub amount: f64,
}

/// Anything that can answer "who funded this wallet?"
#[async_trait]
pub trait FundingSourceProvider: Send + Sync {
    /// Funding sources for one wallet, largest first
    async fn funding_sources(&self, wallet: &str) -> Result<Vec<FundingSource>>;
}

/// Funding lookups against an on-chain log index
pub struct OnChainFundingFetcher {
    logs: Arc<dyn LogIndex>,
    token_contract: String,
    decimals: u32,
    block_range: u64,
}

impl OnChainFundingFetcher {
    pub fn new(logs: Arc<dyn LogIndex>, config: &FundingConfig) -> Self {
        Self {
            logs,
            token_contract: config.token_contract.clone(),
            decimals: config.token_decimals,
            block_range: config.block_range,
        }
    }
}

#[async_trait]
impl FundingSourceProvider for OnChainFundingFetcher {
    async fn funding_sources(&self, wallet: &str) -> Result<Vec<FundingSource>> {
        let head = self
            .logs
            .latest_block()
            .await
            .ok_or_else(|| Error::RpcExhausted { method: "eth_blockNumber".to_string() })?;

        let query = LogQuery {
            address: self.token_contract.clone(),
            topics: vec![
                Some(TRANSFER_TOPIC.to_string()),
                None,
                Some(address_to_topic(wallet)),
            ],
            from_block: head.saturating_sub(self.block_range),
            to_block: None,
        };

        let logs = self
            .logs
            .logs(&query)
            .await
            .ok_or_else(|| Error::RpcExhausted { method: "eth_getLogs".to_string() })?;

        let sources = aggregate_transfers(wallet, &logs, self.decimals);
        debug!(wallet, logs = logs.len(), sources = sources.len(), "Fetched funding sources");
        Ok(sources)
    }
}

/// Sum transfer logs into `wallet` per sender, largest first.
///
/// Logs whose sender topic or amount cannot be decoded are skipped, as are
/// transfers the wallet sent to itself.
pub fn aggregate_transfers(wallet: &str, logs: &[Log], decimals: u32) -> Vec<FundingSource> {
    let scale = 10f64.powi(decimals as i32);
    let wallet = wallet.to_ascii_lowercase();
    let mut totals: HashMap<String, f64> = HashMap::new();

    for log in logs {
        let Some(sender) = log.topics.get(1).and_then(|t| topic_to_address(t)) else {
            debug!(tx = ?log.transaction_hash, "Transfer log without sender topic");
            continue;
        };
        let Some(raw_amount) = parse_hex_u128(&log.data) else {
            debug!(tx = ?log.transaction_hash, "Undecodable transfer amount");
            continue;
        };
        if sender == wallet {
            continue;
        }
        *totals.entry(sender).or_insert(0.0) += raw_amount as f64 / scale;
    }

    let mut sources: Vec<FundingSource> = totals
        .into_iter()
        .map(|(address, amount)| FundingSource { address, amount })
        .collect();
    sources.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    sources
}
