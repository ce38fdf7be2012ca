use super::{deliver, nak, outbound, receive, transmit, Outbound};
use crate::bvll::Bvll;
use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::{Address, Pdu};

/// Plain B/IP node: unicast and subnet broadcast, no BBMD services.
#[derive(Debug, Clone)]
pub struct BipSimple {
    station: Ipv4Station,
}

impl BipSimple {
    pub fn new(station: Ipv4Station) -> Self {
        Self { station }
    }

    pub fn station(&self) -> &Ipv4Station {
        &self.station
    }
}

impl Layer for BipSimple {
    fn name(&self) -> &'static str {
        "bip-simple"
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        match outbound(&pdu) {
            Some(Outbound::Unicast(to)) => transmit(io, to, &Bvll::OriginalUnicastNpdu(pdu.data)),
            Some(Outbound::Broadcast) => transmit(
                io,
                self.station.broadcast(),
                &Bvll::OriginalBroadcastNpdu(pdu.data),
            ),
            None => log::warn!("B/IP cannot reach {}", pdu.destination),
        }
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let Some((sender, frame)) = receive(&self.station, &pdu) else {
            return;
        };
        match frame {
            Bvll::OriginalUnicastNpdu(npdu) => deliver(io, sender, self.station.address(), npdu),
            Bvll::OriginalBroadcastNpdu(npdu) => deliver(io, sender, Address::LocalBroadcast, npdu),
            Bvll::ForwardedNpdu { origin, npdu } => {
                deliver(io, origin, Address::LocalBroadcast, npdu)
            }
            Bvll::Result(code) => log::debug!("BVLC result {code:?} from {sender}"),
            other => nak(io, sender, other.function()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BipSimple;
    use crate::bvll::{Bvll, BvlcResultCode};
    use bacflow_core::address::Ipv4Station;
    use bacflow_core::comm::Stack;
    use bacflow_core::{Address, Pdu};
    use std::net::SocketAddrV4;
    use std::time::Instant;

    fn station() -> Ipv4Station {
        "192.168.0.10/24".parse().unwrap()
    }

    fn from(addr: &str, frame: Bvll) -> Pdu {
        let addr: SocketAddrV4 = addr.parse().unwrap();
        Pdu::new(frame.to_vec().unwrap()).with_source(Address::from_socket_addr(addr))
    }

    #[test]
    fn broadcast_goes_to_directed_subnet_address() {
        let mut stack = Stack::new(Instant::now());
        let bip = stack.add(BipSimple::new(station()));
        stack.request(bip, Pdu::new(vec![1, 0]).with_destination(Address::LocalBroadcast));

        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.destination.socket_addr(),
            Some("192.168.0.255:47808".parse().unwrap())
        );
        assert_eq!(
            Bvll::decode(&sent[0].1.data).unwrap(),
            Bvll::OriginalBroadcastNpdu(vec![1, 0])
        );
    }

    #[test]
    fn forwarded_npdu_surfaces_with_origin() {
        let mut stack = Stack::new(Instant::now());
        let bip = stack.add(BipSimple::new(station()));
        stack.receive(
            bip,
            from(
                "192.168.0.1:47808",
                Bvll::ForwardedNpdu {
                    origin: "10.9.8.7:47808".parse().unwrap(),
                    npdu: vec![1, 0, 0x10, 0x08],
                },
            ),
        );

        let up = stack.take_deliveries();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].1.source.socket_addr(), Some("10.9.8.7:47808".parse().unwrap()));
        assert_eq!(up[0].1.destination, Address::LocalBroadcast);
        assert_eq!(up[0].1.data, vec![1, 0, 0x10, 0x08]);
    }

    #[test]
    fn bbmd_requests_are_nakked() {
        let mut stack = Stack::new(Instant::now());
        let bip = stack.add(BipSimple::new(station()));
        stack.receive(bip, from("192.168.0.20:47808", Bvll::RegisterForeignDevice { ttl: 60 }));

        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            Bvll::decode(&sent[0].1.data).unwrap(),
            Bvll::Result(BvlcResultCode::RegisterForeignDeviceNak)
        );
        assert!(stack.take_deliveries().is_empty());
    }

    #[test]
    fn own_echo_and_garbage_are_dropped() {
        let mut stack = Stack::new(Instant::now());
        let bip = stack.add(BipSimple::new(station()));
        stack.receive(bip, from("192.168.0.10:47808", Bvll::OriginalBroadcastNpdu(vec![1, 0])));
        stack.receive(
            bip,
            Pdu::new(vec![0x81, 0x0A, 0x00])
                .with_source(Address::from_socket_addr("192.168.0.3:47808".parse().unwrap())),
        );
        assert!(stack.take_deliveries().is_empty());
        assert!(stack.take_transmits().is_empty());
    }
}
