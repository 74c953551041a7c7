//! Movantchat broker binary.
//!
//! # Usage
//!
//! ```bash
//! movantchat-broker --bind 0.0.0.0:1883
//! ```

use std::time::Duration;

use clap::Parser;
use movantchat_broker::{Broker, BrokerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Movantchat pub/sub broker
#[derive(Parser, Debug)]
#[command(name = "movantchat-broker")]
#[command(about = "Topic pub/sub broker for movantchat clients")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:1883")]
    bind: String,

    /// Drop connections silent for this many seconds
    #[arg(long, default_value = "120")]
    idle_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = BrokerRuntimeConfig {
        bind_address: args.bind,
        idle_timeout: Duration::from_secs(args.idle_timeout),
    };

    let broker = Broker::bind(config).await?;
    tracing::info!("broker listening on {}", broker.local_addr()?);

    broker.run().await?;

    Ok(())
}
