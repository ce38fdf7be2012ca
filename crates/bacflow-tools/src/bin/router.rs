use bacflow_core::address::Ipv4Station;
use bacflow_stack::{NsapConfig, RouterBuilder, RouterPort};
use clap::Parser;
use std::str::FromStr;
use std::time::Duration;

/// `network=ip/prefix:port`
#[derive(Debug, Clone)]
struct PortArg {
    network: u16,
    station: Ipv4Station,
}

impl FromStr for PortArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, station) = s
            .split_once('=')
            .ok_or_else(|| format!("expected network=ip/prefix:port, got '{s}'"))?;
        Ok(Self {
            network: network
                .parse()
                .map_err(|_| format!("invalid network number '{network}'"))?,
            station: station.parse().map_err(|err| format!("{err}"))?,
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "bacflow-router", about = "Route between B/IP networks")]
struct Args {
    /// One routed port as `network=ip/prefix:port`; give at least two.
    #[arg(long = "port", required = true, num_args = 1)]
    ports: Vec<PortArg>,
    #[arg(long, default_value_t = 10)]
    discovery_wait_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    if args.ports.len() < 2 {
        return Err("a router needs at least two --port".into());
    }
    let nsap = NsapConfig::default().with_router_discovery_wait(Duration::from_secs(args.discovery_wait_secs));
    let builder = args
        .ports
        .iter()
        .fold(RouterBuilder::new().with_nsap(nsap), |builder, port| {
            builder.with_port(RouterPort::new(port.network, port.station))
        });

    let (event_loop, _) = builder.bind().await?;
    for port in &args.ports {
        log::info!("routing network {} on {}", port.network, port.station);
    }
    event_loop.run().await?;
    Ok(())
}
