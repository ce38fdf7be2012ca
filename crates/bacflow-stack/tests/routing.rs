mod common;

use bacflow_core::comm::Stack;
use bacflow_core::services::WhoIsRequest;
use bacflow_core::types::{CharacterString, ObjectId, ObjectType, PropertyId};
use bacflow_core::Address;
use bacflow_stack::{
    Application, DeviceBuilder, DeviceStack, IoController, IoError, Iocb, LocalDeviceConfig,
    NsapConfig, Nsap, RouterBuilder, RouterPort, SmapConfig,
};
use common::{station, Port, Wire};
use std::time::{Duration, Instant};

const NEAR: &str = "10.0.1.2/24:47808";
const FAR: &str = "10.0.2.2/24:47808";

fn device(wire: &mut Wire, at: &str, instance: u32, nsap: NsapConfig, smap: SmapConfig) -> (usize, DeviceStack) {
    let mut stack = Stack::new(wire.t0);
    let layers = DeviceBuilder::new(station(at))
        .with_device(
            LocalDeviceConfig::default()
                .with_instance(instance)
                .with_name(format!("device-{instance}")),
        )
        .with_nsap(nsap)
        .with_smap(smap)
        .build(&mut stack)
        .unwrap();
    let node = wire.add(
        stack,
        vec![Port {
            layer: layers.link,
            station: station(at),
        }],
    );
    (node, layers)
}

/// near (network 1) <-> router <-> far (network 2)
fn network(nsap: NsapConfig, smap: SmapConfig) -> (Wire, usize, DeviceStack) {
    let mut wire = Wire::new(Instant::now());
    let (near, near_layers) = device(&mut wire, NEAR, 10, nsap.clone(), smap);
    device(&mut wire, FAR, 20, nsap, SmapConfig::default());

    let ports = [(1, "10.0.1.1/24:47808"), (2, "10.0.2.1/24:47808")];
    let mut stack = Stack::new(wire.t0);
    let router = ports
        .iter()
        .fold(RouterBuilder::new(), |builder, (net, at)| {
            builder.with_port(RouterPort::new(*net, station(at)))
        })
        .build(&mut stack)
        .unwrap();
    let router_ports = router
        .links
        .iter()
        .zip(ports)
        .map(|(layer, (_, at))| Port {
            layer: *layer,
            station: station(at),
        })
        .collect();
    wire.add(stack, router_ports);
    wire.start();
    (wire, near, near_layers)
}

fn far_address() -> Address {
    let mac = Address::from_socket_addr(station(FAR).addr);
    Address::remote_station(2, mac.mac().unwrap().to_vec()).unwrap()
}

fn submit(wire: &mut Wire, node: usize, layers: &DeviceStack, iocb: &Iocb) {
    let iocb = iocb.clone();
    wire.stack(node)
        .with_layer::<Application, _>(layers.app, |app, io| app.request_io(iocb, io))
        .unwrap();
    wire.settle();
}

#[test]
fn read_property_crosses_the_router() {
    let (mut wire, near, layers) = network(NsapConfig::default(), SmapConfig::default());

    let nsap = wire.stack(near).layer::<Nsap>(layers.nsap).unwrap();
    assert_eq!(nsap.routes().get(2).map(|route| route.port), Some(0));

    let read = Iocb::read_property(
        far_address(),
        ObjectId::new(ObjectType::Device, 20),
        PropertyId::ObjectName,
        None,
    )
    .unwrap();
    submit(&mut wire, near, &layers, &read);
    let name = read.wait_read_property().unwrap();
    assert_eq!(name.cast_out::<CharacterString>().unwrap(), CharacterString("device-20".into()));
}

#[test]
fn global_who_is_finds_the_remote_device() {
    let (mut wire, near, layers) = network(NsapConfig::default(), SmapConfig::default());

    let who_is = Iocb::who_is(Address::GlobalBroadcast, WhoIsRequest::global()).unwrap();
    submit(&mut wire, near, &layers, &who_is);

    let app = wire.stack(near).layer::<Application>(layers.app).unwrap();
    let far = app.devices().by_instance(20).unwrap();
    assert_eq!(far.address, far_address());
}

#[test]
fn traffic_for_an_unknown_network_is_dropped_after_discovery() {
    let nsap = NsapConfig::default().with_router_discovery_wait(Duration::from_secs(2));
    let smap = SmapConfig::default()
        .with_retries(0)
        .with_apdu_timeout(Duration::from_secs(10));
    let (mut wire, near, layers) = network(nsap, smap);

    let nowhere = Address::remote_station(9, vec![10, 0, 9, 9, 0xBA, 0xC0]).unwrap();
    let read = Iocb::read_property(
        nowhere,
        ObjectId::new(ObjectType::Device, 99),
        PropertyId::ObjectName,
        None,
    )
    .unwrap();
    submit(&mut wire, near, &layers, &read);
    assert_eq!(wire.stack(near).layer::<Nsap>(layers.nsap).unwrap().pending_len(9), 1);

    wire.run_until(Duration::from_secs(3));
    assert_eq!(wire.stack(near).layer::<Nsap>(layers.nsap).unwrap().pending_len(9), 0);
    assert_eq!(read.outcome(), None);

    wire.run_until(Duration::from_secs(11));
    assert_eq!(read.outcome(), Some(Err(IoError::Timeout)));
}
