use super::{deliver, outbound, receive, transmit, Outbound, FDT_SWEEP_TIMER};
use crate::bvll::{Bvll, BvlcResultCode};
use crate::tables::{BdtEntry, ForeignDeviceTable};
use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::{Address, Pdu};
use std::net::SocketAddrV4;
use std::time::Duration;

const FDT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// B/IP node acting as a Broadcast Management Device.
///
/// Broadcasts heard on the local subnet are forwarded to every BDT peer and
/// every live foreign device; Forwarded-NPDUs from peers are handed up and
/// passed on to the foreign devices.
///
/// In NAT mode the BBMD sits behind a translating router: it is known to its
/// peers by `global`, peers are always reached by unicast, and nothing is
/// broadcast on the private subnet.
#[derive(Debug, Clone)]
pub struct BipBbmd {
    station: Ipv4Station,
    global: Option<SocketAddrV4>,
    bdt: Vec<BdtEntry>,
    fdt: ForeignDeviceTable,
}

impl BipBbmd {
    pub fn new(station: Ipv4Station) -> Self {
        Self {
            station,
            global: None,
            bdt: Vec::new(),
            fdt: ForeignDeviceTable::new(),
        }
    }

    pub fn nat(station: Ipv4Station, global: SocketAddrV4) -> Self {
        Self {
            global: Some(global),
            ..Self::new(station)
        }
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = BdtEntry>) -> Self {
        for peer in peers {
            self.add_peer(peer);
        }
        self
    }

    /// Adds or replaces the BDT entry for `peer.address`.
    pub fn add_peer(&mut self, peer: BdtEntry) {
        match self.bdt.iter_mut().find(|e| e.address == peer.address) {
            Some(existing) => *existing = peer,
            None => self.bdt.push(peer),
        }
    }

    pub fn remove_peer(&mut self, address: SocketAddrV4) -> bool {
        let before = self.bdt.len();
        self.bdt.retain(|e| e.address != address);
        self.bdt.len() != before
    }

    pub fn station(&self) -> &Ipv4Station {
        &self.station
    }

    pub fn bdt(&self) -> &[BdtEntry] {
        &self.bdt
    }

    pub fn fdt(&self) -> &ForeignDeviceTable {
        &self.fdt
    }

    pub fn is_nat(&self) -> bool {
        self.global.is_some()
    }

    /// The address peers and foreign devices know this BBMD by.
    pub fn bbmd_address(&self) -> SocketAddrV4 {
        self.global.unwrap_or(self.station.addr)
    }

    fn is_self(&self, addr: SocketAddrV4) -> bool {
        addr == self.station.addr || Some(addr) == self.global
    }

    /// Sends a Forwarded-NPDU to every peer but ourselves and to every live
    /// foreign device but `skip`.
    fn forward(&self, io: &mut LayerIo, origin: SocketAddrV4, npdu: &[u8], skip: Option<SocketAddrV4>) {
        let frame = Bvll::ForwardedNpdu {
            origin,
            npdu: npdu.to_vec(),
        };
        for peer in self.bdt.iter().filter(|peer| !self.is_self(peer.address)) {
            let to = if self.is_nat() {
                peer.address
            } else {
                peer.forward_address()
            };
            transmit(io, to, &frame);
        }
        let now = io.now();
        for fd in self.fdt.live(now).filter(|fd| Some(*fd) != skip) {
            transmit(io, fd, &frame);
        }
    }

    fn broadcast_locally(&self, io: &mut LayerIo, origin: SocketAddrV4, npdu: Vec<u8>) {
        if !self.is_nat() {
            transmit(io, self.station.broadcast(), &Bvll::ForwardedNpdu { origin, npdu });
        }
    }

    /// Peers reach us by unicast unless our own BDT entry carries a
    /// directed-broadcast mask, in which case the subnet already heard it.
    fn rebroadcasts_forwarded(&self) -> bool {
        !self.is_nat()
            && self
                .bdt
                .iter()
                .find(|e| self.is_self(e.address))
                .map_or(true, BdtEntry::is_two_hop)
    }

    fn sweep(&mut self, io: &LayerIo) {
        for expired in self.fdt.sweep(io.now()) {
            log::debug!("foreign device {expired} registration expired");
        }
    }
}

impl Layer for BipBbmd {
    fn name(&self) -> &'static str {
        if self.is_nat() {
            "bip-nat"
        } else {
            "bip-bbmd"
        }
    }

    fn start(&mut self, io: &mut LayerIo) {
        io.schedule_recurring(FDT_SWEEP_TIMER, io.now() + FDT_SWEEP_INTERVAL, FDT_SWEEP_INTERVAL);
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        match outbound(&pdu) {
            Some(Outbound::Unicast(to)) => transmit(io, to, &Bvll::OriginalUnicastNpdu(pdu.data)),
            Some(Outbound::Broadcast) => {
                if !self.is_nat() {
                    transmit(
                        io,
                        self.station.broadcast(),
                        &Bvll::OriginalBroadcastNpdu(pdu.data.clone()),
                    );
                }
                self.forward(io, self.bbmd_address(), &pdu.data, None);
            }
            None => log::warn!("B/IP cannot reach {}", pdu.destination),
        }
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let Some((sender, frame)) = receive(&self.station, &pdu) else {
            return;
        };
        let now = io.now();
        match frame {
            Bvll::Result(code) => log::debug!("BVLC result {code:?} from {sender}"),
            Bvll::OriginalUnicastNpdu(npdu) => deliver(io, sender, self.station.address(), npdu),
            Bvll::OriginalBroadcastNpdu(npdu) => {
                if self.is_nat() {
                    log::debug!("NAT BBMD ignores local broadcast from {sender}");
                    return;
                }
                self.forward(io, sender, &npdu, None);
                deliver(io, sender, Address::LocalBroadcast, npdu);
            }
            Bvll::ForwardedNpdu { origin, npdu } => {
                if self.is_self(origin) {
                    log::trace!("dropping our own forwarded broadcast from {sender}");
                    return;
                }
                let frame = Bvll::ForwardedNpdu {
                    origin,
                    npdu: npdu.clone(),
                };
                for fd in self.fdt.live(now) {
                    transmit(io, fd, &frame);
                }
                if self.rebroadcasts_forwarded() {
                    self.broadcast_locally(io, origin, npdu.clone());
                }
                deliver(io, origin, Address::LocalBroadcast, npdu);
            }
            Bvll::DistributeBroadcastToNetwork(npdu) => {
                if !self.fdt.is_live(sender, now) {
                    log::warn!("distribute-broadcast from unregistered {sender}");
                    transmit(
                        io,
                        sender,
                        &Bvll::Result(BvlcResultCode::DistributeBroadcastToNetworkNak),
                    );
                    return;
                }
                self.forward(io, sender, &npdu, Some(sender));
                self.broadcast_locally(io, sender, npdu.clone());
                deliver(io, sender, Address::LocalBroadcast, npdu);
            }
            Bvll::RegisterForeignDevice { ttl } => {
                if ttl == 0 {
                    self.fdt.delete(sender);
                    log::debug!("foreign device {sender} unregistered");
                } else if self.fdt.register(sender, ttl, now) {
                    log::info!("foreign device {sender} registered for {ttl}s");
                }
                transmit(io, sender, &Bvll::Result(BvlcResultCode::Successful));
            }
            Bvll::ReadBroadcastDistributionTable => {
                transmit(io, sender, &Bvll::ReadBroadcastDistributionTableAck(self.bdt.clone()));
            }
            Bvll::WriteBroadcastDistributionTable(entries) => {
                log::info!("BDT rewritten by {sender} with {} entries", entries.len());
                self.bdt.clear();
                for entry in entries {
                    self.add_peer(entry);
                }
                transmit(io, sender, &Bvll::Result(BvlcResultCode::Successful));
            }
            Bvll::ReadForeignDeviceTable => {
                transmit(io, sender, &Bvll::ReadForeignDeviceTableAck(self.fdt.entries(now)));
            }
            Bvll::DeleteForeignDeviceTableEntry(address) => {
                let code = if self.fdt.delete(address) {
                    BvlcResultCode::Successful
                } else {
                    BvlcResultCode::DeleteForeignDeviceTableEntryNak
                };
                transmit(io, sender, &Bvll::Result(code));
            }
            Bvll::ReadBroadcastDistributionTableAck(_) | Bvll::ReadForeignDeviceTableAck(_) => {
                log::debug!("unsolicited table ack from {sender}");
            }
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut LayerIo) {
        if token == FDT_SWEEP_TIMER {
            self.sweep(io);
        }
    }
}
