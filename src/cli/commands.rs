//! CLI command implementations

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::chain::fills::recent_order_fills;
use crate::chain::{FundingSourceProvider, LogIndex, OnChainFundingFetcher, RpcPool};
use crate::cluster::MIN_FUNDING_AMOUNT;
use crate::config::{is_evm_address, Config};
use crate::pipeline::{collect_dataset, AnalysisReport, Analyzer, WalletDetail};
use crate::source::{MarketSource, PolymarketClient, ResolvedMarket, Trade, TradeSource};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary and top wallets
    Text,
    /// Full report as JSON
    Json,
}

/// Options for the `analyze` command
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Read trades from a JSON file instead of the data API
    pub trades: Option<PathBuf>,
    /// Read resolved markets from a JSON file instead of the gamma API
    pub markets: Option<PathBuf>,
    pub no_clusters: bool,
    pub output: OutputFormat,
    /// Wallets to list in text output (defaults to the configured top-N)
    pub top: Option<usize>,
}

/// Run the full analysis and print the report
pub async fn analyze(config: &Config, args: AnalyzeArgs) -> Result<()> {
    let analyzer = if args.no_clusters {
        info!("Clustering disabled");
        Analyzer::new(&config.analysis, config.funding.max_candidates)
    } else {
        Analyzer::from_config(config).context("Failed to set up funding lookups")?
    };

    let (trades, markets) =
        load_dataset(config, args.trades.as_deref(), args.markets.as_deref()).await?;
    let report = analyzer
        .run(trades, markets)
        .await
        .context("Analysis run failed")?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            print_report(&report, args.top.unwrap_or(config.analysis.top_suspicious))
        }
    }
    Ok(())
}

/// Trades and markets from files, or from the upstream APIs when no trade
/// file is given
async fn load_dataset(
    config: &Config,
    trades_path: Option<&Path>,
    markets_path: Option<&Path>,
) -> Result<(Vec<Trade>, Vec<ResolvedMarket>)> {
    match (trades_path, markets_path) {
        (Some(trades_path), markets_path) => {
            let trades: Vec<Trade> = read_json(trades_path)?;
            let markets: Vec<ResolvedMarket> = match markets_path {
                Some(path) => read_json(path)?,
                None => Vec::new(),
            };
            info!(
                trades = trades.len(),
                markets = markets.len(),
                "Loaded dataset from files"
            );
            Ok((trades, markets))
        }
        (None, Some(_)) => bail!("--markets requires --trades"),
        (None, None) => {
            let client = PolymarketClient::new(&config.sources)?;
            let dataset = collect_dataset(
                &client,
                &client,
                &config.sources.trade_limits(),
                &config.sources.market_limits(),
            )
            .await
            .context("Failed to collect trades and markets")?;
            Ok(dataset)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Cannot parse {}", path.display()))
}

fn print_report(report: &AnalysisReport, top: usize) {
    let s = &report.summary;

    println!("\n=== INSIDER RADAR ===\n");
    println!(
        "Trades: {} ({} rejected)   Markets: {}",
        s.total_trades, s.rejected_trades, s.total_markets
    );
    println!(
        "Wallets: {} ({} scored, {} skipped)",
        s.total_wallets, s.scored_wallets, s.skipped_wallets
    );
    println!(
        "Flagged: {} (critical {}, high {}, medium {})",
        s.flagged_wallets, s.critical_wallets, s.high_wallets, s.medium_wallets
    );
    println!(
        "Volume: ${:.0}, suspicious ${:.0} ({:.1}%)",
        s.total_volume, s.suspicious_volume, s.suspicious_volume_percent
    );
    if let Some(funding) = &s.funding {
        println!(
            "Funding: {} candidates, {} cached, {} fetched, {} failed",
            funding.candidates, funding.cache_hits, funding.fetched, funding.failed
        );
        println!(
            "Clusters: {} ({} wallets, largest {})",
            s.clustering.total_clusters,
            s.clustering.clustered_wallets,
            s.clustering.largest_cluster
        );
    }

    println!("\n=== MOST SUSPICIOUS ===\n");
    if report.top_suspicious.is_empty() {
        println!("No wallets scored.");
    }
    for wallet in report.top_suspicious.iter().take(top) {
        let cluster = wallet
            .cluster_id
            .map(|id| format!("  cluster #{} ({})", id, wallet.cluster_size))
            .unwrap_or_default();
        println!(
            "{:<9} {:>3}  {}  {}/{} wins  p={:.2e}  last-min {:.0}%  stake ${:.0}{}",
            wallet.suspicion_level.to_string().to_uppercase(),
            wallet.suspicion_score,
            wallet.address,
            wallet.wins,
            wallet.scored_trades,
            wallet.p_value,
            wallet.timing.last_minute_ratio * 100.0,
            wallet.total_stake,
            cluster,
        );
    }

    if !report.clusters.is_empty() {
        println!("\n=== CLUSTERS ===\n");
        for cluster in &report.clusters {
            println!(
                "#{} {} wallets, ${:.0} shared funding from {}",
                cluster.id,
                cluster.size,
                cluster.total_funding,
                cluster.funding_sources.join(", ")
            );
        }
    }
}

/// Options for the `wallet` command
#[derive(Debug, Clone)]
pub struct WalletArgs {
    pub address: String,
    pub trades: Option<PathBuf>,
    pub markets: Option<PathBuf>,
    pub no_clusters: bool,
    pub output: OutputFormat,
}

/// Show one wallet's analysis and annotated trade history
pub async fn wallet(config: &Config, args: WalletArgs) -> Result<()> {
    // File datasets may key wallets any way; live data uses EVM addresses
    if args.trades.is_none() && !is_evm_address(&args.address) {
        bail!("Not a valid address: {}", args.address);
    }

    let analyzer = if args.no_clusters {
        Analyzer::new(&config.analysis, config.funding.max_candidates)
    } else {
        Analyzer::from_config(config).context("Failed to set up funding lookups")?
    };
    let (trades, markets) =
        load_dataset(config, args.trades.as_deref(), args.markets.as_deref()).await?;

    let Some(detail) = analyzer.inspect(&args.address, trades, markets).await? else {
        bail!("Wallet not found: {}", args.address);
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&detail)?),
        OutputFormat::Text => print_wallet(&detail),
    }
    Ok(())
}

fn print_wallet(detail: &WalletDetail) {
    println!("\n=== WALLET {} ===\n", detail.address);
    match &detail.analysis {
        Some(a) => {
            println!(
                "Level: {} (score {})",
                a.suspicion_level.to_string().to_uppercase(),
                a.suspicion_score
            );
            println!(
                "Record: {}/{} wins ({} verified)  p={:.2e}  ROI {:.1}%",
                a.wins,
                a.scored_trades,
                a.verified_trades,
                a.p_value,
                a.roi * 100.0
            );
            println!(
                "Timing: last-min {:.0}%  last-10m {:.0}%  last-hour {:.0}%",
                a.timing.last_minute_ratio * 100.0,
                a.timing.last_10min_ratio * 100.0,
                a.timing.last_hour_ratio * 100.0
            );
            if let Some(id) = a.cluster_id {
                println!(
                    "Cluster: #{} ({} wallets) via {}",
                    id,
                    a.cluster_size,
                    a.shared_funding_source.as_deref().unwrap_or("-")
                );
            }
        }
        None => println!("Not scored: too few trades."),
    }

    println!("\n=== TRADES (newest first) ===\n");
    for t in &detail.trades {
        let before = t
            .minutes_before
            .map(|m| format!("{:.1}m before", m))
            .unwrap_or_else(|| "unresolved".to_string());
        println!(
            "{}  {:<4} {:>10.2} {} @ {:.3}  {}  {}  pnl {:+.2}  {}",
            t.trade.timestamp.format("%Y-%m-%d %H:%M:%S"),
            t.trade.side,
            t.trade.amount,
            t.trade.outcome,
            t.trade.price,
            if t.result.won() { "WON " } else { "LOST" },
            before,
            t.pnl,
            t.market_question
                .as_deref()
                .or(t.trade.market_title.as_deref())
                .unwrap_or(t.trade.market_id.as_str()),
        );
    }
}

/// Print funding sources for one wallet
pub async fn funding(config: &Config, address: &str) -> Result<()> {
    if !is_evm_address(address) {
        bail!("Not a valid address: {}", address);
    }

    let pool = Arc::new(RpcPool::new(&config.rpc)?);
    let fetcher = OnChainFundingFetcher::new(pool, &config.funding);
    let sources = fetcher
        .funding_sources(&address.to_lowercase())
        .await
        .context("Funding lookup failed")?;

    println!(
        "\n=== FUNDING SOURCES (last {} blocks) ===\n",
        config.funding.block_range
    );
    if sources.is_empty() {
        println!("No incoming transfers.");
    }
    for source in &sources {
        let marker = if source.amount >= MIN_FUNDING_AMOUNT {
            ""
        } else {
            "  (below clustering threshold)"
        };
        println!("{}  ${:.2}{}", source.address, source.amount, marker);
    }
    Ok(())
}

/// Print recent exchange fills
pub async fn fills(config: &Config, blocks: u64, limit: usize) -> Result<()> {
    let pool = RpcPool::new(&config.rpc)?;
    let fills = recent_order_fills(&pool, blocks).await;

    println!("\n=== ORDER FILLS (last {} blocks) ===\n", blocks);
    if fills.is_empty() {
        println!("No fills found.");
    }
    for fill in fills.iter().take(limit) {
        let when = fill
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10}  {}  {}",
            fill.block_number.map(|b| b.to_string()).unwrap_or_default(),
            when,
            fill.tx_hash.as_deref().unwrap_or("-"),
        );
    }
    if fills.len() > limit {
        println!("... {} more", fills.len() - limit);
    }
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check upstream reachability
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC pool... ");
    match check_rpc(config).await {
        Ok((block, latency)) => println!("OK (block {}, {}ms)", block, latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    let client = PolymarketClient::new(&config.sources)?;

    print!("Data API... ");
    let start = Instant::now();
    match client.fetch_trades(0, 1).await {
        Ok(_) => println!("OK ({}ms)", start.elapsed().as_millis()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Gamma API... ");
    let start = Instant::now();
    match client.fetch_resolved_markets(0, 1).await {
        Ok(_) => println!("OK ({}ms)", start.elapsed().as_millis()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All upstreams reachable.");
    } else {
        println!("Some upstreams are unreachable. Check the errors above.");
    }

    Ok(())
}

async fn check_rpc(config: &Config) -> Result<(u64, u128)> {
    let pool = RpcPool::new(&config.rpc)?;
    let start = Instant::now();
    let block = pool
        .latest_block()
        .await
        .ok_or_else(|| anyhow!("no endpoint answered eth_blockNumber"))?;
    Ok((block, start.elapsed().as_millis()))
}
