use bacflow_core::types::{ObjectId, PropertyId};
use bacflow_core::Address;
use bacflow_stack::Iocb;
use bacflow_tools::{render_value, LinkArgs, RunningDevice};
use clap::Parser;
use serde_json::json;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacflow-readprop", about = "Read one property of one object")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,
    /// Device address: `ip:port`, or `net:ip:port` behind a router.
    address: Address,
    /// Object as `type,instance`, e.g. `analog-input,3` or `8,1234`.
    object: ObjectId,
    /// Property name or number.
    #[arg(default_value = "present-value")]
    property: PropertyId,
    #[arg(long)]
    index: Option<u32>,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let device = RunningDevice::start(args.link.builder("bacflow-readprop"))?;
    device.wait_registered(Duration::from_secs(5))?;

    let read = Iocb::read_property(args.address.clone(), args.object, args.property, args.index)?;
    device.handle.request_io(device.layers.app, read.clone());
    let outcome = read.wait_timeout(Duration::from_secs(args.timeout_secs));
    device.shutdown()?;

    let value = match outcome {
        Some(Ok(response)) => response.decode_ack::<bacflow_core::services::ReadPropertyAck>()?.value,
        Some(Err(err)) => {
            eprintln!("read failed: {err}");
            std::process::exit(1);
        }
        None => {
            eprintln!("no answer from {} within {}s", args.address, args.timeout_secs);
            std::process::exit(1);
        }
    };
    let rendered = render_value(&value);
    if args.json {
        let report = json!({
            "address": args.address.to_string(),
            "object": args.object.to_string(),
            "property": args.property.to_string(),
            "index": args.index,
            "value": rendered,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {} = {rendered}", args.object, args.property);
    }
    Ok(())
}
