//! Insider Radar Library
//!
//! Flags prediction-market wallets whose trading looks informed: improbable
//! win rates, trades placed minutes before resolution, outsized positions,
//! and groups of wallets funded from the same source.

pub mod analysis;
pub mod chain;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{AnalysisReport, Analyzer};
