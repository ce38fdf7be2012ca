mod common;

use bacflow_core::apdu::AbortReason;
use bacflow_core::comm::Stack;
use bacflow_core::constructed::{Any, ArrayOf};
use bacflow_core::services::WhoIsRequest;
use bacflow_core::types::{
    CharacterString, ErrorClass, ErrorCode, MaxApdu, ObjectId, ObjectType, PropertyId, Real,
};
use bacflow_core::Address;
use bacflow_stack::iocb::IoResponse;
use bacflow_stack::{
    Application, DeviceBuilder, DeviceStack, IoController, IoError, Iocb, LocalDeviceConfig,
    LocalObject, SmapConfig,
};
use common::{station, Port, Wire};
use std::time::{Duration, Instant};

const CLIENT: &str = "10.0.0.1/24:47808";
const SERVER: &str = "10.0.0.2/24:47808";

fn device(wire: &mut Wire, at: &str, instance: u32, smap: SmapConfig, objects: Vec<LocalObject>) -> (usize, DeviceStack) {
    let mut stack = Stack::new(wire.t0);
    let mut builder = DeviceBuilder::new(station(at))
        .with_device(
            LocalDeviceConfig::default()
                .with_instance(instance)
                .with_name(format!("device-{instance}")),
        )
        .with_smap(smap);
    for object in objects {
        builder = builder.with_object(object);
    }
    let layers = builder.build(&mut stack).unwrap();
    let node = wire.add(
        stack,
        vec![Port {
            layer: layers.link,
            station: station(at),
        }],
    );
    (node, layers)
}

fn submit(wire: &mut Wire, node: usize, layers: &DeviceStack, iocb: &Iocb) {
    let iocb = iocb.clone();
    wire.stack(node)
        .with_layer::<Application, _>(layers.app, |app, io| app.request_io(iocb, io))
        .unwrap();
    wire.settle();
}

fn server_address() -> Address {
    Address::from_socket_addr(station(SERVER).addr)
}

fn setpoint() -> LocalObject {
    LocalObject::new(ObjectId::new(ObjectType::AnalogValue, 1), "setpoint")
        .unwrap()
        .with_value(PropertyId::PresentValue, &Real(21.5))
        .unwrap()
        .writable(PropertyId::PresentValue)
}

#[test]
fn who_is_fills_the_device_cache() {
    let mut wire = Wire::new(Instant::now());
    let (client, client_layers) = device(&mut wire, CLIENT, 20, SmapConfig::default(), Vec::new());
    device(&mut wire, SERVER, 10, SmapConfig::default(), Vec::new());
    wire.start();

    let who_is = Iocb::who_is(Address::LocalBroadcast, WhoIsRequest::range(5, 15)).unwrap();
    submit(&mut wire, client, &client_layers, &who_is);
    assert_eq!(who_is.outcome(), Some(Ok(IoResponse::Sent)));

    let app = wire.stack(client).layer::<Application>(client_layers.app).unwrap();
    let peer = app.devices().by_instance(10).unwrap();
    assert_eq!(peer.address, server_address());
    assert_eq!(peer.max_apdu, 1476);
    assert!(app.devices().by_instance(20).is_none());
}

#[test]
fn read_and_write_a_present_value() {
    let mut wire = Wire::new(Instant::now());
    let (client, client_layers) = device(&mut wire, CLIENT, 20, SmapConfig::default(), Vec::new());
    let (server, server_layers) = device(&mut wire, SERVER, 10, SmapConfig::default(), vec![setpoint()]);
    wire.start();
    let av1 = ObjectId::new(ObjectType::AnalogValue, 1);

    let read = Iocb::read_property(server_address(), av1, PropertyId::PresentValue, None).unwrap();
    submit(&mut wire, client, &client_layers, &read);
    let value = read.wait_read_property().unwrap();
    assert_eq!(value.cast_out::<Real>().unwrap(), Real(21.5));

    let write = Iocb::write_property(
        server_address(),
        av1,
        PropertyId::PresentValue,
        Any::cast_in(&Real(55.0)).unwrap(),
    )
    .unwrap();
    submit(&mut wire, client, &client_layers, &write);
    assert!(matches!(write.outcome(), Some(Ok(IoResponse::SimpleAck(_)))));

    let app = wire.stack(server).layer::<Application>(server_layers.app).unwrap();
    let stored = app
        .device()
        .object(av1)
        .unwrap()
        .read(PropertyId::PresentValue, None)
        .unwrap();
    assert_eq!(stored.cast_out::<Real>().unwrap(), Real(55.0));
    assert_eq!(
        wire.stack(client).layer::<Application>(client_layers.app).unwrap().pending(),
        0
    );
}

#[test]
fn service_errors_come_back_as_remote_errors() {
    let mut wire = Wire::new(Instant::now());
    let (client, client_layers) = device(&mut wire, CLIENT, 20, SmapConfig::default(), Vec::new());
    device(&mut wire, SERVER, 10, SmapConfig::default(), vec![setpoint()]);
    wire.start();

    let missing = Iocb::read_property(
        server_address(),
        ObjectId::new(ObjectType::AnalogInput, 7),
        PropertyId::PresentValue,
        None,
    )
    .unwrap();
    submit(&mut wire, client, &client_layers, &missing);
    assert_eq!(
        missing.outcome(),
        Some(Err(IoError::RemoteError {
            class: ErrorClass::Object,
            code: ErrorCode::UnknownObject,
        }))
    );

    let name = Iocb::write_property(
        server_address(),
        ObjectId::new(ObjectType::AnalogValue, 1),
        PropertyId::ObjectName,
        Any::cast_in(&CharacterString("renamed".into())).unwrap(),
    )
    .unwrap();
    submit(&mut wire, client, &client_layers, &name);
    assert_eq!(
        name.outcome(),
        Some(Err(IoError::RemoteError {
            class: ErrorClass::Property,
            code: ErrorCode::WriteAccessDenied,
        }))
    );
}

#[test]
fn object_list_is_read_in_segments() {
    let mut wire = Wire::new(Instant::now());
    let small = SmapConfig::default().with_max_apdu(MaxApdu::UpTo50);
    let (client, client_layers) = device(&mut wire, CLIENT, 20, small, Vec::new());
    let inputs = (1..=40)
        .map(|n| LocalObject::new(ObjectId::new(ObjectType::AnalogInput, n), format!("input-{n}")).unwrap())
        .collect();
    device(&mut wire, SERVER, 10, SmapConfig::default(), inputs);
    wire.start();

    let read = Iocb::read_property(
        server_address(),
        ObjectId::new(ObjectType::Device, 10),
        PropertyId::ObjectList,
        None,
    )
    .unwrap();
    submit(&mut wire, client, &client_layers, &read);
    let list = read.wait_read_property().unwrap().cast_out::<ArrayOf<ObjectId>>().unwrap();
    assert_eq!(list.len(), 41);
    assert!(list.items().contains(&ObjectId::new(ObjectType::AnalogInput, 40)));
}

#[test]
fn long_writes_need_a_known_segmenting_peer() {
    let mut wire = Wire::new(Instant::now());
    let (client, client_layers) = device(&mut wire, CLIENT, 20, SmapConfig::default(), Vec::new());
    let narrow = SmapConfig::default().with_max_apdu(MaxApdu::UpTo128);
    let (server, server_layers) = device(&mut wire, SERVER, 10, narrow, Vec::new());
    wire.start();

    let device_id = ObjectId::new(ObjectType::Device, 10);
    let text = "a long description that cannot fit a 128 octet APDU ".repeat(6);
    let write = || {
        Iocb::write_property(
            server_address(),
            device_id,
            PropertyId::Description,
            Any::cast_in(&CharacterString(text.clone())).unwrap(),
        )
        .unwrap()
    };

    let blind = write();
    submit(&mut wire, client, &client_layers, &blind);
    assert_eq!(
        blind.outcome(),
        Some(Err(IoError::Aborted {
            reason: AbortReason::SegmentationNotSupported,
        }))
    );

    let who_is = Iocb::who_is(Address::LocalBroadcast, WhoIsRequest::global()).unwrap();
    submit(&mut wire, client, &client_layers, &who_is);
    let informed = write();
    submit(&mut wire, client, &client_layers, &informed);
    assert!(matches!(informed.outcome(), Some(Ok(IoResponse::SimpleAck(_)))));

    let app = wire.stack(server).layer::<Application>(server_layers.app).unwrap();
    let stored = app
        .device()
        .object(device_id)
        .unwrap()
        .read(PropertyId::Description, None)
        .unwrap();
    assert_eq!(stored.cast_out::<CharacterString>().unwrap(), CharacterString(text));
}

#[test]
fn silent_peer_times_out_after_the_retries() {
    let mut wire = Wire::new(Instant::now());
    let smap = SmapConfig::default()
        .with_retries(1)
        .with_apdu_timeout(Duration::from_secs(2));
    let (client, client_layers) = device(&mut wire, CLIENT, 20, smap, Vec::new());
    device(&mut wire, SERVER, 10, SmapConfig::default(), vec![setpoint()]);
    wire.start();
    wire.mute = Some(station(SERVER));

    let read = Iocb::read_property(
        server_address(),
        ObjectId::new(ObjectType::AnalogValue, 1),
        PropertyId::PresentValue,
        None,
    )
    .unwrap();
    submit(&mut wire, client, &client_layers, &read);
    wire.run_until(Duration::from_secs(3));
    assert_eq!(read.outcome(), None);
    assert_eq!(wire.dropped.len(), 2);

    wire.run_until(Duration::from_secs(5));
    assert_eq!(read.outcome(), Some(Err(IoError::Timeout)));
}
