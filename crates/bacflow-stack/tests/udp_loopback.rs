use bacflow_core::types::{CharacterString, ObjectId, ObjectType, PropertyId};
use bacflow_core::Address;
use bacflow_stack::{spawn_thread, DeviceBuilder, DeviceStack, Iocb, LocalDeviceConfig, LoopHandle, Nsap};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

type Running = (LoopHandle, JoinHandle<Result<(), bacflow_stack::StackError>>, DeviceStack);

fn start(instance: u32) -> Running {
    let (tx, rx) = mpsc::channel();
    let (handle, thread) = spawn_thread(move || async move {
        let (event_loop, layers) = DeviceBuilder::new("127.0.0.1/8:0".parse().unwrap())
            .with_device(
                LocalDeviceConfig::default()
                    .with_instance(instance)
                    .with_name(format!("loopback-{instance}")),
            )
            .bind()
            .await?;
        let _ = tx.send(layers);
        Ok(event_loop)
    })
    .unwrap();
    (handle, thread, rx.recv().unwrap())
}

fn station_of(running: &Running) -> Address {
    let nsap = running.2.nsap;
    running
        .0
        .call(move |stack| stack.layer::<Nsap>(nsap).map(|nsap| nsap.adapters()[0].address().clone()))
        .unwrap()
        .unwrap()
}

#[test]
fn read_property_over_loopback_udp() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = start(301);
    let client = start(302);

    let read = Iocb::read_property(
        station_of(&server),
        ObjectId::new(ObjectType::Device, 301),
        PropertyId::ObjectName,
        None,
    )
    .unwrap();
    client.0.request_io(client.2.app, read.clone());
    let outcome = read.wait_timeout(Duration::from_secs(5)).expect("no answer over UDP");
    let name = outcome
        .unwrap()
        .decode_ack::<bacflow_core::services::ReadPropertyAck>()
        .unwrap()
        .value;
    assert_eq!(name.cast_out::<CharacterString>().unwrap(), CharacterString("loopback-301".into()));

    for (handle, thread, _) in [server, client] {
        handle.stop();
        thread.join().unwrap().unwrap();
    }
}
