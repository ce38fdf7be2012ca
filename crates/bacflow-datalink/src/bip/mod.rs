//! BACnet/IP layers.
//!
//! Each layer sits at the bottom of a stack. Going down it wraps an NPDU in
//! a BVLL frame and requests a [`Pdu`] whose destination is the six-octet
//! UDP endpoint; going up it receives raw datagrams whose source is the
//! sending endpoint and responds with the NPDU.

mod bbmd;
mod foreign;
mod simple;

pub use bbmd::BipBbmd;
pub use foreign::{BipForeign, RegistrationStatus};
pub use simple::BipSimple;

use crate::bvll::{Bvll, BvlcFunction, BvlcResultCode};
use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::LayerIo;
use bacflow_core::{Address, Pdu};
use std::net::SocketAddrV4;

/// Timer token of the BBMD foreign-device sweep.
pub const FDT_SWEEP_TIMER: u64 = 1;
/// Timer token of the foreign-device registration renewal.
pub const REGISTRATION_TIMER: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outbound {
    Unicast(SocketAddrV4),
    Broadcast,
}

fn outbound(pdu: &Pdu) -> Option<Outbound> {
    match &pdu.destination {
        Address::LocalBroadcast => Some(Outbound::Broadcast),
        dest @ Address::LocalStation(_) => dest.socket_addr().map(Outbound::Unicast),
        _ => None,
    }
}

fn transmit(io: &mut LayerIo, to: SocketAddrV4, frame: &Bvll) {
    match frame.to_vec() {
        Ok(bytes) => io.request(Pdu::new(bytes).with_destination(Address::from_socket_addr(to))),
        Err(err) => log::warn!("cannot encode {:?} for {to}: {err}", frame.function()),
    }
}

fn deliver(io: &mut LayerIo, source: SocketAddrV4, destination: Address, npdu: Vec<u8>) {
    io.response(
        Pdu::new(npdu)
            .with_source(Address::from_socket_addr(source))
            .with_destination(destination),
    );
}

/// Decodes a received datagram, dropping our own echoes and garbage.
fn receive(station: &Ipv4Station, pdu: &Pdu) -> Option<(SocketAddrV4, Bvll)> {
    let Some(sender) = pdu.source.socket_addr() else {
        log::warn!("datagram without an IP source: {}", pdu.source);
        return None;
    };
    if sender == station.addr {
        log::trace!("ignoring own datagram");
        return None;
    }
    match Bvll::decode(&pdu.data) {
        Ok(frame) => Some((sender, frame)),
        Err(err) => {
            log::warn!("dropping malformed BVLL frame from {sender}: {err}");
            None
        }
    }
}

/// Answers a BBMD-only request from a node that is not a BBMD.
fn nak(io: &mut LayerIo, sender: SocketAddrV4, function: BvlcFunction) {
    match BvlcResultCode::nak_for(function) {
        Some(code) => {
            log::debug!("{function:?} from {sender} refused with {code:?}");
            transmit(io, sender, &Bvll::Result(code));
        }
        None => log::debug!("ignoring {function:?} from {sender}"),
    }
}
