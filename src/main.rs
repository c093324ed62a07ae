//! Insider Radar - prediction-market insider trading detector
//!
//! Scores every wallet in a trade sample for improbable win rates,
//! last-minute timing and position size, then clusters the suspicious ones
//! by shared on-chain funding.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use insider_radar::cli::commands::{self, AnalyzeArgs, OutputFormat, WalletArgs};
use insider_radar::config::Config;

/// Insider Radar - flag informed trading on prediction markets
#[derive(Parser)]
#[command(name = "radar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "radar.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score wallets and cluster the suspicious ones
    Analyze {
        /// Trades JSON file (fetched from the data API if omitted)
        #[arg(long)]
        trades: Option<PathBuf>,

        /// Resolved markets JSON file
        #[arg(long)]
        markets: Option<PathBuf>,

        /// Skip on-chain funding lookups and clustering
        #[arg(long)]
        no_clusters: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Number of wallets to list
        #[arg(long)]
        top: Option<usize>,
    },

    /// Show one wallet's analysis and trade history
    Wallet {
        /// Wallet address (0x...)
        address: String,

        /// Trades JSON file (fetched from the data API if omitted)
        #[arg(long)]
        trades: Option<PathBuf>,

        /// Resolved markets JSON file
        #[arg(long)]
        markets: Option<PathBuf>,

        /// Skip on-chain funding lookups and clustering
        #[arg(long)]
        no_clusters: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Show funding sources of a wallet
    Funding {
        /// Wallet address (0x...)
        address: String,
    },

    /// Show recent on-chain order fills
    Fills {
        /// Look-back window in blocks
        #[arg(long, default_value = "1000")]
        blocks: u64,

        /// Number of fills to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC and API reachability
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for reports
    let filter = EnvFilter::from_default_env().add_directive("insider_radar=info".parse()?);
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Analyze {
            trades,
            markets,
            no_clusters,
            output,
            top,
        } => {
            let args = AnalyzeArgs {
                trades,
                markets,
                no_clusters,
                output,
                top,
            };
            commands::analyze(&config, args).await
        }
        Commands::Wallet {
            address,
            trades,
            markets,
            no_clusters,
            output,
        } => {
            let args = WalletArgs {
                address,
                trades,
                markets,
                no_clusters,
                output,
            };
            commands::wallet(&config, args).await
        }
        Commands::Funding { address } => commands::funding(&config, &address).await,
        Commands::Fills { blocks, limit } => commands::fills(&config, blocks, limit).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
