use bacflow_core::services::WhoIsRequest;
use bacflow_core::Address;
use bacflow_stack::{Application, Iocb};
use bacflow_tools::{LinkArgs, RunningDevice};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacflow-whois", about = "Send Who-Is and list the devices that answer")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,
    #[arg(long, requires = "high")]
    low: Option<u32>,
    #[arg(long, requires = "low")]
    high: Option<u32>,
    /// `*` for the local network, `*:*` for every network, `net:*` for one.
    #[arg(long, default_value = "*:*")]
    destination: Address,
    #[arg(long, default_value_t = 3)]
    timeout_secs: u64,
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let device = RunningDevice::start(args.link.builder("bacflow-whois"))?;
    if !device.wait_registered(Duration::from_secs(5))? {
        eprintln!("foreign device registration did not complete, broadcasts may not leave the subnet");
    }

    let request = match (args.low, args.high) {
        (Some(low), Some(high)) => WhoIsRequest::range(low, high),
        _ => WhoIsRequest::global(),
    };
    let who_is = Iocb::who_is(args.destination, request)?;
    device.handle.request_io(device.layers.app, who_is.clone());
    who_is.wait()?;
    std::thread::sleep(Duration::from_secs(args.timeout_secs));

    let app = device.layers.app;
    let mut found = device.handle.call(move |stack| {
        stack
            .layer::<Application>(app)
            .map(|app| app.devices().devices())
            .unwrap_or_default()
    })?;
    device.shutdown()?;

    let own = args.link.device_instance;
    found.retain(|info| info.device_id.instance() != own);
    found.sort_by_key(|info| info.device_id.instance());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        for info in &found {
            println!(
                "{} at {}: max APDU {}, {:?}, vendor {}",
                info.device_id, info.address, info.max_apdu, info.segmentation, info.vendor_id
            );
        }
    }
    Ok(())
}
