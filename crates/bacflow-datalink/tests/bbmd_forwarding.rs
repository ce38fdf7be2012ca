use bacflow_core::comm::Stack;
use bacflow_core::{Address, Pdu};
use bacflow_datalink::{BdtEntry, BipBbmd, Bvll};
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

fn addr(s: &str) -> SocketAddrV4 {
    s.parse().unwrap()
}

fn datagram(from: &str, frame: Bvll) -> Pdu {
    Pdu::new(frame.to_vec().unwrap()).with_source(Address::from_socket_addr(addr(from)))
}

fn sent(stack: &mut Stack) -> Vec<(SocketAddrV4, Bvll)> {
    let mut out: Vec<_> = stack
        .take_transmits()
        .into_iter()
        .map(|(_, pdu)| {
            (
                pdu.destination.socket_addr().unwrap(),
                Bvll::decode(&pdu.data).unwrap(),
            )
        })
        .collect();
    out.sort_by_key(|(to, _)| *to);
    out
}

fn peers() -> Vec<BdtEntry> {
    vec![
        "10.0.0.1".parse().unwrap(),
        "10.1.0.1:47808/255.255.255.0".parse().unwrap(),
        "10.2.0.1".parse().unwrap(),
    ]
}

#[test]
fn local_broadcast_reaches_each_peer_and_live_foreign_device_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let t0 = Instant::now();
    let mut stack = Stack::new(t0);
    let bbmd = stack.add(BipBbmd::new("10.0.0.1/24".parse().unwrap()).with_peers(peers()));
    stack.start();

    stack.receive(bbmd, datagram("172.16.0.5:47808", Bvll::RegisterForeignDevice { ttl: 5 }));
    stack.advance(t0 + Duration::from_secs(3));
    stack.receive(bbmd, datagram("172.16.0.6:47808", Bvll::RegisterForeignDevice { ttl: 60 }));
    stack.advance(t0 + Duration::from_secs(6));
    sent(&mut stack);

    let npdu = vec![0x01, 0x20, 0xFF, 0xFF, 0x00, 0xFF, 0x10, 0x08];
    stack.receive(bbmd, datagram("10.0.0.77:47808", Bvll::OriginalBroadcastNpdu(npdu.clone())));

    let forwarded = Bvll::ForwardedNpdu {
        origin: addr("10.0.0.77:47808"),
        npdu: npdu.clone(),
    };
    assert_eq!(
        sent(&mut stack),
        vec![
            (addr("10.1.0.255:47808"), forwarded.clone()),
            (addr("10.2.0.1:47808"), forwarded.clone()),
            (addr("172.16.0.6:47808"), forwarded),
        ]
    );

    let up = stack.take_deliveries();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].1.destination, Address::LocalBroadcast);
    assert_eq!(up[0].1.data, npdu);
}

#[test]
fn forwarded_npdu_is_rebroadcast_by_two_hop_peer() {
    let mut stack = Stack::new(Instant::now());
    let a = stack.add(BipBbmd::new("10.0.0.1/24".parse().unwrap()).with_peers(peers()));
    let c = stack.add(BipBbmd::new("10.2.0.1/24".parse().unwrap()).with_peers(peers()));

    stack.request(a, Pdu::new(vec![1, 0, 0x10, 0x08]).with_destination(Address::LocalBroadcast));
    let from_a = sent(&mut stack);
    assert_eq!(from_a.len(), 3);
    assert_eq!(
        from_a[0],
        (
            addr("10.0.0.255:47808"),
            Bvll::OriginalBroadcastNpdu(vec![1, 0, 0x10, 0x08])
        )
    );

    let (_, to_c) = from_a
        .iter()
        .find(|(to, _)| *to == addr("10.2.0.1:47808"))
        .cloned()
        .unwrap();
    stack.receive(c, datagram("10.0.0.1:47808", to_c));

    assert_eq!(
        sent(&mut stack),
        vec![(
            addr("10.2.0.255:47808"),
            Bvll::ForwardedNpdu {
                origin: addr("10.0.0.1:47808"),
                npdu: vec![1, 0, 0x10, 0x08],
            }
        )]
    );
    let up = stack.take_deliveries();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].1.source.socket_addr(), Some(addr("10.0.0.1:47808")));
}

#[test]
fn directed_broadcast_peer_does_not_rebroadcast() {
    let mut stack = Stack::new(Instant::now());
    let b = stack.add(BipBbmd::new("10.1.0.1/24".parse().unwrap()).with_peers(peers()));
    stack.receive(
        b,
        datagram(
            "10.0.0.1:47808",
            Bvll::ForwardedNpdu {
                origin: addr("10.0.0.77:47808"),
                npdu: vec![1, 0],
            },
        ),
    );
    assert!(sent(&mut stack).is_empty());
    assert_eq!(stack.take_deliveries().len(), 1);
}

#[test]
fn nat_bbmd_unicasts_with_global_origin() {
    let mut stack = Stack::new(Instant::now());
    let nat = stack.add(
        BipBbmd::nat("192.168.1.2/24".parse().unwrap(), addr("203.0.113.9:47808"))
            .with_peers([
                "203.0.113.9".parse::<BdtEntry>().unwrap(),
                "10.1.0.1:47808/255.255.255.0".parse().unwrap(),
            ]),
    );
    stack.request(nat, Pdu::new(vec![1, 0]).with_destination(Address::LocalBroadcast));
    assert_eq!(
        sent(&mut stack),
        vec![(
            addr("10.1.0.1:47808"),
            Bvll::ForwardedNpdu {
                origin: addr("203.0.113.9:47808"),
                npdu: vec![1, 0],
            }
        )]
    );

    stack.receive(nat, datagram("192.168.1.50:47808", Bvll::OriginalBroadcastNpdu(vec![1, 0])));
    assert!(sent(&mut stack).is_empty());
    assert!(stack.take_deliveries().is_empty());
}
