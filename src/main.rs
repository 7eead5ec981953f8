//! Bithook CLI
//!
//! Subscribes to the blockchain feed and relays each event to a webhook:
//! - Blocks, unconfirmed transactions, or one address
//! - Debug pings for testing a webhook
//!
//! Runs until the feed connection fails, then exits non-zero.

use anyhow::Context;
use bithook::{generate_default_config, Bridge, Config, LoggingConfig, SubscriptionRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bithook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay real-time blockchain feed events to a webhook")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Webhook URL receiving one POST per event
    #[arg(long, global = true)]
    pub webhook: Option<String>,

    /// Feed websocket URL
    #[arg(long, global = true)]
    pub feed_url: Option<String>,

    /// Config file (default: search standard locations)
    #[arg(short, long = "config", global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to new blocks
    #[command(alias = "block")]
    Blocks,

    /// Subscribe to new unconfirmed transactions
    Unconfirmed,

    /// Subscribe to an address
    #[command(alias = "addr")]
    Address {
        /// Address to watch
        address: String,
    },

    /// Receive the latest transaction. Use for testing.
    Test,

    /// Receive the latest block. Use for testing.
    TestBlock,

    /// Print the version
    Version,

    /// Print a default config file
    Config,
}

impl Commands {
    /// Subscription for this command, `None` for commands that don't connect
    fn subscription(&self) -> Option<SubscriptionRequest> {
        match self {
            Commands::Blocks => Some(SubscriptionRequest::Blocks),
            Commands::Unconfirmed => Some(SubscriptionRequest::Unconfirmed),
            Commands::Address { address } => Some(SubscriptionRequest::address(address.as_str())),
            Commands::Test => Some(SubscriptionRequest::DebugPing),
            Commands::TestBlock => Some(SubscriptionRequest::DebugPingBlock),
            Commands::Version | Commands::Config => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(request) = cli.command.subscription() else {
        match cli.command {
            Commands::Version => println!("Version: {}", env!("CARGO_PKG_VERSION")),
            _ => print!("{}", generate_default_config()),
        }
        return Ok(());
    };

    let config = load_config(&cli)?;
    init_tracing(&config.logging);

    let bridge = Bridge::new(&config).context("Invalid configuration")?;

    match bridge.run(&request).await {
        Ok(never) => match never {},
        Err(e) => Err(anyhow::Error::new(e).context("Feed relay stopped")),
    }
}

/// File/env config with command-line overrides on top
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config_file {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::load_default().context("Failed to load default config")?,
    };

    if let Some(webhook) = &cli.webhook {
        config.relay.callback_url = Some(webhook.clone());
    }
    if let Some(feed_url) = &cli.feed_url {
        config.feed.url = feed_url.clone();
    }

    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bithook={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
