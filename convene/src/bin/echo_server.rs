//! Echo server: the convention leader, advertising `Server`.
//!
//! Usage:
//!   echo-server --listen 10.0.0.1:1900

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use convene::convene_api::{Capabilities, NodeAddress};
use convene::logging::{self, LogConfig};
use convene::{echo, ActorSpace, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "echo-server")]
#[command(about = "Convention leader hosting echo responders")]
#[command(version)]
struct Args {
    /// Address to listen on and advertise; the port defaults to 1900
    #[arg(short, long, default_value = "127.0.0.1:1900")]
    listen: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(LogConfig {
        level: args.log_level,
        json_format: args.json_logs,
        ..Default::default()
    });

    let address = NodeAddress::parse(&args.listen).context("invalid --listen address")?;
    let config = NodeConfig::leader(address, Capabilities::new().with(echo::SERVER_CAPABILITY, true));

    let space = ActorSpace::builder(config)
        .catalog(echo::catalog())
        .start()
        .await
        .context("failed to start actor space")?;
    info!(address = %space.address(), "echo server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("received shutdown signal");
    space.shutdown().await;
    Ok(())
}
