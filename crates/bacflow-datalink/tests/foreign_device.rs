use bacflow_core::comm::{LayerId, Stack};
use bacflow_core::{Address, Pdu};
use bacflow_datalink::{BipBbmd, BipForeign, Bvll, RegistrationStatus};
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

const FD: &str = "172.16.0.5:47808";
const BBMD: &str = "10.0.0.1:47808";

fn addr(s: &str) -> SocketAddrV4 {
    s.parse().unwrap()
}

/// Moves every pending datagram between the two layers, tagging each with
/// its sender as the network would.
fn shuttle(stack: &mut Stack, fd: LayerId, bbmd: LayerId) -> Vec<(SocketAddrV4, Bvll)> {
    let mut elsewhere = Vec::new();
    loop {
        let pending = stack.take_transmits();
        if pending.is_empty() {
            return elsewhere;
        }
        for (from, pdu) in pending {
            let to = pdu.destination.socket_addr().unwrap();
            let (sender, target) = if from == fd { (FD, bbmd) } else { (BBMD, fd) };
            let reaches = (from == fd && to == addr(BBMD)) || (from == bbmd && to == addr(FD));
            if reaches {
                stack.receive(target, pdu.with_source(Address::from_socket_addr(addr(sender))));
            } else {
                elsewhere.push((to, Bvll::decode(&pdu.data).unwrap()));
            }
        }
    }
}

fn setup() -> (Stack, LayerId, LayerId, Instant) {
    let t0 = Instant::now();
    let mut stack = Stack::new(t0);
    let fd = stack.add(BipForeign::new(
        "172.16.0.5/24".parse().unwrap(),
        BBMD.parse().unwrap(),
        20,
    ));
    let bbmd = stack.add(BipBbmd::new("10.0.0.1/24".parse().unwrap()));
    stack.start();
    shuttle(&mut stack, fd, bbmd);
    (stack, fd, bbmd, t0)
}

#[test]
fn registration_is_acknowledged_and_kept_alive() {
    let (mut stack, fd, bbmd, t0) = setup();
    assert_eq!(
        stack.layer::<BipForeign>(fd).unwrap().status(),
        RegistrationStatus::Registered
    );

    for secs in (1..=60).map(Duration::from_secs) {
        stack.advance(t0 + secs);
        shuttle(&mut stack, fd, bbmd);
        assert!(stack
            .layer::<BipBbmd>(bbmd)
            .unwrap()
            .fdt()
            .is_live(FD.parse().unwrap(), t0 + secs));
    }
}

#[test]
fn foreign_broadcast_is_distributed() {
    let (mut stack, fd, bbmd, _) = setup();
    stack.request(fd, Pdu::new(vec![1, 0, 0x10, 0x08]).with_destination(Address::LocalBroadcast));
    let elsewhere = shuttle(&mut stack, fd, bbmd);

    assert_eq!(
        elsewhere,
        vec![(
            "10.0.0.255:47808".parse().unwrap(),
            Bvll::ForwardedNpdu {
                origin: FD.parse().unwrap(),
                npdu: vec![1, 0, 0x10, 0x08],
            }
        )]
    );
    let up = stack.take_deliveries();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].0, bbmd);
}

#[test]
fn broadcasts_from_the_bbmd_side_reach_the_foreign_device() {
    let (mut stack, fd, bbmd, _) = setup();
    stack.request(bbmd, Pdu::new(vec![1, 0]).with_destination(Address::LocalBroadcast));
    shuttle(&mut stack, fd, bbmd);

    let up = stack.take_deliveries();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].0, fd);
    assert_eq!(up[0].1.source.socket_addr(), Some(BBMD.parse().unwrap()));
    assert_eq!(up[0].1.destination, Address::LocalBroadcast);
}
