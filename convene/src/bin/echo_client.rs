//! Echo client: joins the convention, runs one echo exchange, reports timing.
//!
//! Usage:
//!   echo-client 10.0.0.1 1000

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use convene::convene_api::{Capabilities, NodeAddress, CONVENTION_ADDRESS_KEY};
use convene::echo::{self, EchoClient};
use convene::logging::{self, LogConfig};
use convene::{ActorSpace, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "echo-client")]
#[command(about = "Runs a counted ping/pong exchange against an echo server")]
#[command(version)]
struct Args {
    /// Convention leader, `host` or `host:port`
    leader: String,

    /// Number of pings to send
    #[arg(default_value_t = 10)]
    count: i64,

    /// Address of this node; port 0 picks a free port
    #[arg(short, long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Payload carried by every ping
    #[arg(long, default_value = "hello world")]
    payload: String,

    /// Seconds per wait for the completion token
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,

    /// Number of waits before giving up
    #[arg(long, default_value_t = 3)]
    max_waits: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(LogConfig {
        level: args.log_level,
        ..Default::default()
    });

    let leader = NodeAddress::parse(&args.leader).context("invalid leader address")?;
    let address = NodeAddress::parse(&args.listen).context("invalid --listen address")?;
    let leader_port = leader.port().unwrap_or(convene::convene_api::DEFAULT_CONVENTION_PORT);
    let capabilities = Capabilities::new()
        .with(echo::CLIENT_CAPABILITY, true)
        .with(CONVENTION_ADDRESS_KEY, (leader.host(), leader_port));

    let space = ActorSpace::builder(NodeConfig::new(address, capabilities))
        .catalog(echo::catalog())
        .start()
        .await
        .context("failed to join the convention")?;
    info!(address = %space.address(), %leader, "joined");

    let client = EchoClient::new(space.clone())
        .with_payload(args.payload)
        .with_wait(Duration::from_secs(args.wait_secs), args.max_waits);
    let result = client.run(args.count).await;
    space.shutdown().await;

    let report = result.context("echo run failed")?;
    println!(
        "echo of {} pings done in {:?} ({} unexpected replies)",
        args.count, report.elapsed, report.unexpected
    );
    Ok(())
}
