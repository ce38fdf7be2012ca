//! Plumbing shared by the bacflow command-line tools: link flags, a device
//! stack running on its own thread, and value rendering.

use bacflow_core::address::Ipv4Station;
use bacflow_core::constructed::Any;
use bacflow_core::datatype::Atomic;
use bacflow_core::encoding::{AppTag, Tag, TagClass};
use bacflow_core::types::{
    BitString, Boolean, CharacterString, Date, Double, Enumerated, Integer, ObjectId, OctetString,
    Real, Time, Unsigned,
};
use bacflow_datalink::{BipForeign, RegistrationStatus};
use bacflow_stack::{
    spawn_thread, DeviceBuilder, DeviceStack, LinkConfig, LocalDeviceConfig, LoopHandle, StackError,
};
use clap::Args;
use serde_json::{json, Value};
use std::net::SocketAddrV4;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How a tool attaches to the network.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Local endpoint as `ip/prefix:port`; the prefix sets the broadcast address.
    #[arg(long, default_value = "0.0.0.0/0:47808")]
    pub local: Ipv4Station,
    /// Register as a foreign device with this BBMD.
    #[arg(long)]
    pub bbmd: Option<SocketAddrV4>,
    #[arg(long, default_value_t = 60)]
    pub foreign_ttl: u16,
    /// Instance of the tool's own device object.
    #[arg(long, default_value_t = 4_194_302)]
    pub device_instance: u32,
}

impl LinkArgs {
    pub fn builder(&self, name: &str) -> DeviceBuilder {
        let link = match self.bbmd {
            Some(bbmd) => LinkConfig::Foreign {
                bbmd,
                ttl: self.foreign_ttl,
            },
            None => LinkConfig::Simple,
        };
        DeviceBuilder::new(self.local)
            .with_link(link)
            .with_device(
                LocalDeviceConfig::default()
                    .with_instance(self.device_instance)
                    .with_name(name),
            )
    }
}

/// A device stack running on its own event-loop thread.
pub struct RunningDevice {
    pub handle: LoopHandle,
    pub layers: DeviceStack,
    thread: JoinHandle<Result<(), StackError>>,
}

impl RunningDevice {
    pub fn start(builder: DeviceBuilder) -> Result<Self, StackError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let (handle, thread) = spawn_thread(move || async move {
            let (event_loop, layers) = builder.bind().await?;
            let _ = tx.send(layers);
            Ok(event_loop)
        })?;
        let layers = rx.recv().map_err(|_| StackError::Stopped)?;
        Ok(Self {
            handle,
            layers,
            thread,
        })
    }

    /// Blocks until a foreign-device link is registered. Other links are
    /// ready at once.
    pub fn wait_registered(&self, timeout: Duration) -> Result<bool, StackError> {
        let link = self.layers.link;
        let deadline = Instant::now() + timeout;
        loop {
            let status = self
                .handle
                .call(move |stack| stack.layer::<BipForeign>(link).map(BipForeign::status))?;
            match status {
                None | Some(RegistrationStatus::Registered) => return Ok(true),
                Some(RegistrationStatus::Failed(code)) => {
                    log::warn!("foreign device registration refused: {code:?}");
                    return Ok(false);
                }
                Some(_) if Instant::now() >= deadline => return Ok(false),
                Some(_) => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }

    pub fn shutdown(self) -> Result<(), StackError> {
        self.handle.stop();
        self.thread.join().map_err(|_| StackError::Stopped)?
    }
}

/// Renders a property value as JSON: one element per application tag,
/// unwrapped when there is only one.
pub fn render_value(value: &Any) -> Value {
    let mut items: Vec<Value> = value.tags().iter().map(render_tag).collect();
    if items.len() == 1 {
        items.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(items)
    }
}

fn render_tag(tag: &Tag) -> Value {
    let Some(app_tag) = tag.app_tag() else {
        let class = match tag.class {
            TagClass::Opening => "open",
            TagClass::Closing => "close",
            _ => "context",
        };
        return json!({ (class): tag.number });
    };
    match app_tag {
        AppTag::Null => Value::Null,
        AppTag::Boolean => decoded(tag, |Boolean(v): Boolean| json!(v)),
        AppTag::UnsignedInt => decoded(tag, |Unsigned(v): Unsigned| json!(v)),
        AppTag::SignedInt => decoded(tag, |Integer(v): Integer| json!(v)),
        AppTag::Real => decoded(tag, |Real(v): Real| json!(v)),
        AppTag::Double => decoded(tag, |Double(v): Double| json!(v)),
        AppTag::OctetString => decoded(tag, |OctetString(octets): OctetString| {
            json!(octets.iter().map(|b| format!("{b:02x}")).collect::<String>())
        }),
        AppTag::CharacterString => decoded(tag, |CharacterString(v): CharacterString| json!(v)),
        AppTag::BitString => decoded(tag, |v: BitString| json!(format!("{v:?}"))),
        AppTag::Enumerated => decoded(tag, |Enumerated(v): Enumerated| json!(v)),
        AppTag::Date => decoded(tag, |v: Date| json!(format!("{v:?}"))),
        AppTag::Time => decoded(tag, |v: Time| json!(format!("{v:?}"))),
        AppTag::ObjectId => decoded(tag, |v: ObjectId| json!(v.to_string())),
    }
}

fn decoded<T: Atomic>(tag: &Tag, render: impl FnOnce(T) -> Value) -> Value {
    T::from_tag(tag).map_or_else(|err| json!(format!("<{err}>")), render)
}
