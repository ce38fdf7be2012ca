use bacflow_core::address::Ipv4Station;
use bacflow_datalink::{BbmdClient, BdtEntry, UdpPort};
use bacflow_stack::{DeviceBuilder, LinkConfig, LocalDeviceConfig};
use clap::{Parser, Subcommand};
use std::net::SocketAddrV4;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacflow-bbmd", about = "Run a BBMD or manage a remote one")]
struct Args {
    #[command(subcommand)]
    command: Command,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a BBMD with a device object until killed.
    Serve {
        #[arg(long, default_value = "0.0.0.0/0:47808")]
        local: Ipv4Station,
        /// Peer BBMD as `ip:port` or `ip:port/mask`; repeatable.
        #[arg(long = "peer")]
        peers: Vec<BdtEntry>,
        /// Public address when running behind NAT.
        #[arg(long)]
        nat_global: Option<SocketAddrV4>,
        #[arg(long, default_value_t = 599)]
        instance: u32,
    },
    ReadBdt {
        bbmd: SocketAddrV4,
    },
    WriteBdt {
        bbmd: SocketAddrV4,
        entries: Vec<BdtEntry>,
    },
    ReadFdt {
        bbmd: SocketAddrV4,
    },
    DeleteFdt {
        bbmd: SocketAddrV4,
        entry: SocketAddrV4,
    },
}

async fn client(bbmd: SocketAddrV4) -> Result<BbmdClient, Box<dyn std::error::Error>> {
    let port = UdpPort::bind(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0)).await?;
    Ok(BbmdClient::new(port, bbmd).with_timeout(Duration::from_secs(3)))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    match args.command {
        Command::Serve {
            local,
            peers,
            nat_global,
            instance,
        } => {
            let link = match nat_global {
                Some(global) => LinkConfig::Nat { global, peers },
                None => LinkConfig::Bbmd { peers },
            };
            let (event_loop, _) = DeviceBuilder::new(local)
                .with_link(link)
                .with_device(
                    LocalDeviceConfig::default()
                        .with_instance(instance)
                        .with_name("bacflow-bbmd"),
                )
                .bind()
                .await?;
            log::info!("BBMD serving on {local}");
            event_loop.run().await?;
        }
        Command::ReadBdt { bbmd } => {
            let entries = client(bbmd).await?.read_broadcast_distribution_table().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("bdt is empty");
            } else {
                for entry in entries {
                    println!("{entry}");
                }
            }
        }
        Command::WriteBdt { bbmd, entries } => {
            client(bbmd)
                .await?
                .write_broadcast_distribution_table(&entries)
                .await?;
            println!("bdt written ({} entries)", entries.len());
        }
        Command::ReadFdt { bbmd } => {
            let entries = client(bbmd).await?.read_foreign_device_table().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("fdt is empty");
            } else {
                for entry in entries {
                    println!(
                        "{} ttl {}s, {}s left",
                        entry.address, entry.ttl_seconds, entry.remaining_seconds
                    );
                }
            }
        }
        Command::DeleteFdt { bbmd, entry } => {
            client(bbmd)
                .await?
                .delete_foreign_device_table_entry(entry)
                .await?;
            println!("deleted {entry}");
        }
    }
    Ok(())
}
