//! On-chain data access
//!
//! - JSON-RPC over a rotating endpoint pool
//! - Funding-source discovery from token transfer logs
//! - TTL cache and rate-limited batching for funding lookups
//! - Recent exchange fills

pub mod batch;
pub mod cache;
pub mod fills;
pub mod funding;
pub mod rpc;

pub use batch::{BatchConfig, BatchFundingFetcher, FundingLookup};
pub use cache::{CacheConfig, FundingCache};
pub use funding::{FundingSource, FundingSourceProvider, OnChainFundingFetcher};
pub use rpc::{LogIndex, LogQuery, RpcPool};
