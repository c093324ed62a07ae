//! Polygon JSON-RPC client with endpoint rotation
//!
//! Public RPC providers fail often and rate-limit aggressively. Every call
//! walks a small pool of endpoints: attempt `i` goes to
//! `endpoints[(cursor + i) % len]`, and each failure advances the shared
//! cursor so later calls start from the next provider. After `max_retries`
//! failed attempts the call yields `None`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// A log entry returned by `eth_getLogs`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
}

impl Log {
    /// Block number decoded from hex
    pub fn block(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }
}

/// Filter for `eth_getLogs`
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Emitting contract
    pub address: String,
    /// Topic filters by position; `None` matches anything
    pub topics: Vec<Option<String>>,
    pub from_block: u64,
    /// `None` means "latest"
    pub to_block: Option<u64>,
}

impl LogQuery {
    fn to_params(&self) -> Value {
        let to_block = match self.to_block {
            Some(block) => Value::String(to_hex(block)),
            None => Value::String("latest".to_string()),
        };
        json!([{
            "address": self.address,
            "topics": self.topics,
            "fromBlock": to_hex(self.from_block),
            "toBlock": to_block,
        }])
    }
}

/// Minimal on-chain log index used by the funding and fill lookups
#[async_trait]
pub trait LogIndex: Send + Sync {
    /// Current chain head
    async fn latest_block(&self) -> Option<u64>;

    /// Logs matching the query, `None` if the index could not be reached
    async fn logs(&self, query: &LogQuery) -> Option<Vec<Log>>;

    /// Block timestamp, `None` if unavailable
    async fn block_time(&self, block: u64) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC client over a rotating endpoint pool
pub struct RpcPool {
    client: Client,
    endpoints: Vec<String>,
    /// Index of the endpoint the next call starts from
    cursor: Mutex<usize>,
    max_retries: u32,
}

impl RpcPool {
    /// Create a pool from RPC configuration
    pub fn new(config: &RpcConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::Config("RPC endpoint pool is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            cursor: Mutex::new(0),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Endpoint for the given attempt of the current call
    fn endpoint_for_attempt(&self, start: usize, attempt: usize) -> &str {
        &self.endpoints[(start + attempt) % self.endpoints.len()]
    }

    fn current_cursor(&self) -> usize {
        self.cursor.lock().map(|c| *c).unwrap_or(0)
    }

    /// Move the shared cursor to the next endpoint
    fn rotate(&self) {
        if let Ok(mut cursor) = self.cursor.lock() {
            *cursor = (*cursor + 1) % self.endpoints.len();
        }
    }

    /// Issue a JSON-RPC call, rotating through endpoints on failure.
    ///
    /// Returns `None` once every attempt has failed.
    pub async fn call(&self, method: &str, params: Value) -> Option<Value> {
        let start = self.current_cursor();

        for attempt in 0..self.max_retries as usize {
            let endpoint = self.endpoint_for_attempt(start, attempt);
            match self.call_endpoint(endpoint, method, &params).await {
                Ok(Some(result)) => return Some(result),
                // Neither result nor error: try the next endpoint as-is
                Ok(None) => debug!(endpoint, method, "Empty RPC response"),
                Err(e) => {
                    warn!(endpoint, method, error = %e, "RPC call failed");
                    self.rotate();
                }
            }
        }

        warn!(method, attempts = self.max_retries, "{}", Error::RpcExhausted {
            method: method.to_string()
        });
        None
    }

    /// Single call against one endpoint
    async fn call_endpoint(
        &self,
        endpoint: &str,
        method: &str,
        params: &Value,
    ) -> Result<Option<Value>> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Rpc(format!("HTTP {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("invalid JSON-RPC payload: {}", e)))?;

        if let Some(result) = body.result {
            return Ok(Some(result));
        }
        if let Some(error) = body.error {
            return Err(Error::Rpc(format!("{} (code {})", error.message, error.code)));
        }
        Ok(None)
    }
}

#[async_trait]
impl LogIndex for RpcPool {
    async fn latest_block(&self) -> Option<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        result.as_str().and_then(parse_hex_u64)
    }

    async fn logs(&self, query: &LogQuery) -> Option<Vec<Log>> {
        let result = self.call("eth_getLogs", query.to_params()).await?;
        match serde_json::from_value(result) {
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!(error = %e, "Failed to decode eth_getLogs result");
                None
            }
        }
    }

    async fn block_time(&self, block: u64) -> Option<DateTime<Utc>> {
        let result = self
            .call("eth_getBlockByNumber", json!([to_hex(block), false]))
            .await?;
        let seconds = result.get("timestamp")?.as_str().and_then(parse_hex_u64)?;
        DateTime::from_timestamp(seconds as i64, 0)
    }
}

/// Encode a quantity as 0x-prefixed hex
pub fn to_hex(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Decode a 0x-prefixed hex quantity
pub fn parse_hex_u64(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Decode a 32-byte hex word as an unsigned integer.
///
/// Values wider than 128 bits are rejected.
pub fn parse_hex_u128(raw: &str) -> Option<u128> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return if digits.is_empty() { None } else { Some(0) };
    }
    if significant.len() > 32 {
        return None;
    }
    u128::from_str_radix(significant, 16).ok()
}

/// Left-pad an address into a 32-byte topic
pub fn address_to_topic(address: &str) -> String {
    let body = address.strip_prefix("0x").unwrap_or(address).to_lowercase();
    format!("0x{:0>64}", body)
}

/// Take the low 20 bytes of a topic as an address.
///
/// Topics that are not plain hex are rejected.
pub fn topic_to_address(topic: &str) -> Option<String> {
    let body = topic.strip_prefix("0x").unwrap_or(topic);
    if body.len() < 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", body[body.len() - 40..].to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(endpoints: &[&str], max_retries: u32) -> RpcPool {
        RpcPool::new(&RpcConfig {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            timeout_ms: 500,
            max_retries,
        })
        .unwrap()
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(255), "0xff");
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(
            parse_hex_u128("0x0000000000000000000000000000000000000000000000000000000005f5e100"),
            Some(100_000_000)
        );
        assert_eq!(parse_hex_u128("0x0000"), Some(0));
        // 33 significant hex digits overflows u128
        assert_eq!(parse_hex_u128(&format!("0x1{}", "0".repeat(32))), None);
    }

    #[test]
    fn test_topic_address_roundtrip() {
        let address = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";
        let topic = address_to_topic(address);
        assert_eq!(topic.len(), 66);
        assert!(topic.starts_with("0x000000000000000000000000abcdef"));
        assert_eq!(
            topic_to_address(&topic).as_deref(),
            Some("0xabcdef0123456789abcdef0123456789abcdef01")
        );
        assert_eq!(topic_to_address("0x1234"), None);
    }

    #[test]
    fn test_topic_with_non_hex_bytes_is_rejected() {
        // Multibyte character straddling the 20-byte boundary
        let topic = format!("0x{}é{}", "0".repeat(24), "a".repeat(39));
        assert_eq!(topic_to_address(&topic), None);
        assert_eq!(topic_to_address(&format!("0x{}", "zz".repeat(32))), None);
    }

    #[test]
    fn test_log_query_params() {
        let query = LogQuery {
            address: "0xtoken".to_string(),
            topics: vec![Some("0xtopic".to_string()), None],
            from_block: 16,
            to_block: None,
        };
        let params = query.to_params();
        assert_eq!(params[0]["fromBlock"], "0x10");
        assert_eq!(params[0]["toBlock"], "latest");
        assert_eq!(params[0]["topics"][1], Value::Null);
    }

    #[test]
    fn test_endpoint_rotation() {
        let pool = pool(&["http://a", "http://b", "http://c"], 2);
        assert_eq!(pool.endpoint_for_attempt(pool.current_cursor(), 0), "http://a");
        assert_eq!(pool.endpoint_for_attempt(pool.current_cursor(), 1), "http://b");

        pool.rotate();
        pool.rotate();
        assert_eq!(pool.current_cursor(), 2);
        assert_eq!(pool.endpoint_for_attempt(pool.current_cursor(), 1), "http://a");

        pool.rotate();
        assert_eq!(pool.current_cursor(), 0);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let result = RpcPool::new(&RpcConfig {
            endpoints: vec![],
            timeout_ms: 500,
            max_retries: 2,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_call_exhausts_and_rotates() {
        // Nothing listens on port 1, so every attempt fails fast
        let pool = pool(&["http://127.0.0.1:1", "http://127.0.0.1:1/alt"], 2);
        let result = pool.call("eth_blockNumber", json!([])).await;
        assert!(result.is_none());
        // Two failures advanced the cursor twice around a pool of two
        assert_eq!(pool.current_cursor(), 0);
        assert!(pool.latest_block().await.is_none());
    }
}
