//! Configuration loading and validation

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::chain::batch::BatchConfig;
use crate::chain::cache::CacheConfig;
use crate::source::PageLimits;

lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

/// Check that a string looks like a 20-byte hex address
pub fn is_evm_address(address: &str) -> bool {
    EVM_ADDRESS.is_match(address)
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Polygon JSON-RPC endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Endpoint pool, rotated on failure
    #[serde(default = "default_rpc_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per call, each on the next endpoint
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Funding-source lookup and clustering inputs
#[derive(Debug, Clone, Deserialize)]
pub struct FundingConfig {
    /// Settlement token contract (USDC.e on Polygon)
    #[serde(default = "default_token_contract")]
    pub token_contract: String,
    /// Token decimals used to scale transfer amounts
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Look-back window in blocks
    #[serde(default = "default_block_range")]
    pub block_range: u64,
    /// Concurrent lookups per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches (ms)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Cache TTL for funding lookups (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum cached wallets
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Only the top-N flagged wallets are looked up on-chain
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

/// Upstream trade/market API settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,
    #[serde(default = "default_gamma_api_url")]
    pub gamma_api_url: String,
    #[serde(default = "default_trade_limit")]
    pub trade_limit: usize,
    #[serde(default = "default_market_limit")]
    pub market_limit: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Total time spent retrying one page request (ms)
    #[serde(default = "default_retry_budget_ms")]
    pub retry_budget_ms: u64,
    #[serde(default = "default_true")]
    pub order_markets_by_volume: bool,
}

/// Analysis pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Worker tasks for per-wallet scoring
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Size of the "most suspicious" list in the report
    #[serde(default = "default_top_suspicious")]
    pub top_suspicious: usize,
}

fn default_true() -> bool {
    true
}

fn default_rpc_endpoints() -> Vec<String> {
    vec![
        "https://polygon.drpc.org".to_string(),
        "https://polygon-bor-rpc.publicnode.com".to_string(),
        "https://1rpc.io/matic".to_string(),
    ]
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_token_contract() -> String {
    "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string()
}

fn default_token_decimals() -> u32 {
    6
}

fn default_block_range() -> u64 {
    50_000
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_max_candidates() -> usize {
    50
}

fn default_data_api_url() -> String {
    "https://data-api.polymarket.com".to_string()
}

fn default_gamma_api_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_trade_limit() -> usize {
    5_000
}

fn default_market_limit() -> usize {
    500
}

fn default_page_size() -> usize {
    100
}

fn default_page_delay_ms() -> u64 {
    50
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_retry_budget_ms() -> u64 {
    5_000
}

fn default_workers() -> usize {
    4
}

fn default_top_suspicious() -> usize {
    20
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: default_rpc_endpoints(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            token_contract: default_token_contract(),
            token_decimals: default_token_decimals(),
            block_range: default_block_range(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            max_candidates: default_max_candidates(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_api_url: default_data_api_url(),
            gamma_api_url: default_gamma_api_url(),
            trade_limit: default_trade_limit(),
            market_limit: default_market_limit(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_budget_ms: default_retry_budget_ms(),
            order_markets_by_volume: true,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            top_suspicious: default_top_suspicious(),
        }
    }
}

impl FundingConfig {
    /// Cache settings derived from this section
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            max_entries: self.cache_max_entries,
        }
    }

    /// Batch settings derived from this section
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

impl SourceConfig {
    /// Paging limits for the trade collector
    pub fn trade_limits(&self) -> PageLimits {
        PageLimits {
            page_size: self.page_size,
            max_records: self.trade_limit,
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }

    /// Paging limits for the market collector
    pub fn market_limits(&self) -> PageLimits {
        PageLimits {
            page_size: self.page_size,
            max_records: self.market_limit,
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.max_retries", default_max_retries() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix RADAR_)
            .add_source(
                config::Environment::with_prefix("RADAR")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rpc.endpoints"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("rpc.endpoints must list at least one endpoint");
        }
        for endpoint in &self.rpc.endpoints {
            url::Url::parse(endpoint)
                .with_context(|| format!("Invalid RPC endpoint URL: {}", endpoint))?;
        }
        if self.rpc.max_retries == 0 {
            anyhow::bail!("rpc.max_retries must be at least 1");
        }

        if !is_evm_address(&self.funding.token_contract) {
            anyhow::bail!(
                "Invalid funding.token_contract: {}",
                self.funding.token_contract
            );
        }
        if self.funding.batch_size == 0 {
            anyhow::bail!("funding.batch_size must be positive");
        }
        if self.funding.block_range == 0 {
            anyhow::bail!("funding.block_range must be positive");
        }

        for api in [&self.sources.data_api_url, &self.sources.gamma_api_url] {
            url::Url::parse(api).with_context(|| format!("Invalid API URL: {}", api))?;
        }
        if self.sources.page_size == 0 {
            anyhow::bail!("sources.page_size must be positive");
        }

        if self.analysis.workers == 0 {
            anyhow::bail!("analysis.workers must be positive");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let endpoints: Vec<String> = self.rpc.endpoints.iter().map(|e| mask_url(e)).collect();
        format!(
            r#"Configuration:
  RPC:
    endpoints: {:?}
    timeout: {}ms
    max_retries: {}
  Funding:
    token_contract: {}
    block_range: {}
    batch: {} wallets every {}ms
    cache_ttl: {}s
    max_candidates: {}
  Sources:
    data_api: {}
    gamma_api: {}
    trade_limit: {}
    market_limit: {}
  Analysis:
    workers: {}
    top_suspicious: {}
"#,
            endpoints,
            self.rpc.timeout_ms,
            self.rpc.max_retries,
            self.funding.token_contract,
            self.funding.block_range,
            self.funding.batch_size,
            self.funding.batch_delay_ms,
            self.funding.cache_ttl_secs,
            self.funding.max_candidates,
            mask_url(&self.sources.data_api_url),
            mask_url(&self.sources.gamma_api_url),
            self.sources.trade_limit,
            self.sources.market_limit,
            self.analysis.workers,
            self.analysis.top_suspicious,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rpc.endpoints.len(), 3);
        assert_eq!(config.funding.block_range, 50_000);
        assert_eq!(config.analysis.top_suspicious, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rpc]
endpoints = ["https://rpc.example.com/?key=secret"]

[funding]
batch_size = 3
max_candidates = 10
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rpc.endpoints, vec!["https://rpc.example.com/?key=secret"]);
        assert_eq!(config.funding.batch_size, 3);
        assert_eq!(config.funding.max_candidates, 10);
        // Untouched sections fall back to defaults
        assert_eq!(config.sources.page_size, 100);
        assert!(config.masked_display().contains("https://rpc.example.com/?***"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.funding.token_contract = "0x1234".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.endpoints.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.funding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_evm_address() {
        assert!(is_evm_address("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"));
        assert!(!is_evm_address("2791Bca1f2de4661ED88A30C99A7a9449Aa84174"));
        assert!(!is_evm_address("0xzz91Bca1f2de4661ED88A30C99A7a9449Aa84174"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(mask_url("https://api.example.com"), "https://api.example.com");
    }
}
