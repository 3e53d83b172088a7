//! propcast - market-signal proposal service entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Real-time market-signal proposal service for perpetual futures.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PROPCAST_CONFIG).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connections.
    propcast_exchange::init_crypto();

    let args = Args::parse();
    propcast_telemetry::init_logging()?;

    info!("starting propcast v{}", env!("CARGO_PKG_VERSION"));

    let config = propcast_bot::AppConfig::load(args.config)?;
    info!(symbols = ?config.symbols, poll_seconds = config.poll_seconds, "configuration loaded");

    let service = propcast_bot::SignalService::new(config)?;
    service.run().await?;

    Ok(())
}
