use super::{deliver, nak, outbound, receive, transmit, Outbound, REGISTRATION_TIMER};
use crate::bvll::{Bvll, BvlcResultCode};
use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::{Address, Pdu};
use std::net::SocketAddrV4;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Unregistered,
    /// Register-Foreign-Device sent, no result yet.
    Pending,
    Registered,
    Failed(BvlcResultCode),
}

/// B/IP node that reaches the broadcast domain through a remote BBMD.
///
/// Registration is renewed at half the TTL so the BBMD entry never lapses.
#[derive(Debug, Clone)]
pub struct BipForeign {
    station: Ipv4Station,
    bbmd: SocketAddrV4,
    ttl: u16,
    status: RegistrationStatus,
}

impl BipForeign {
    pub fn new(station: Ipv4Station, bbmd: SocketAddrV4, ttl: u16) -> Self {
        Self {
            station,
            bbmd,
            ttl,
            status: RegistrationStatus::Unregistered,
        }
    }

    pub fn station(&self) -> &Ipv4Station {
        &self.station
    }

    pub fn bbmd(&self) -> SocketAddrV4 {
        self.bbmd
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn register(&mut self, io: &mut LayerIo) {
        if self.ttl == 0 {
            log::warn!("foreign device registration needs a non-zero TTL");
            return;
        }
        self.send_registration(io, self.ttl);
        if self.status != RegistrationStatus::Registered {
            self.status = RegistrationStatus::Pending;
        }
        let renew = Duration::from_secs(u64::from(self.ttl / 2).max(1));
        io.schedule_recurring(REGISTRATION_TIMER, io.now() + renew, renew);
    }

    /// Sends a zero-TTL registration and stops renewing.
    pub fn unregister(&mut self, io: &mut LayerIo) {
        self.send_registration(io, 0);
        io.cancel(REGISTRATION_TIMER);
        self.status = RegistrationStatus::Unregistered;
    }

    fn send_registration(&self, io: &mut LayerIo, ttl: u16) {
        log::debug!("registering with BBMD {} for {ttl}s", self.bbmd);
        transmit(io, self.bbmd, &Bvll::RegisterForeignDevice { ttl });
    }
}

impl Layer for BipForeign {
    fn name(&self) -> &'static str {
        "bip-foreign"
    }

    fn start(&mut self, io: &mut LayerIo) {
        if self.ttl > 0 {
            self.register(io);
        }
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        match outbound(&pdu) {
            Some(Outbound::Unicast(to)) => transmit(io, to, &Bvll::OriginalUnicastNpdu(pdu.data)),
            Some(Outbound::Broadcast) => {
                if self.status == RegistrationStatus::Registered {
                    transmit(io, self.bbmd, &Bvll::DistributeBroadcastToNetwork(pdu.data));
                } else {
                    log::warn!("broadcast dropped, not registered with {}", self.bbmd);
                }
            }
            None => log::warn!("B/IP cannot reach {}", pdu.destination),
        }
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let Some((sender, frame)) = receive(&self.station, &pdu) else {
            return;
        };
        match frame {
            Bvll::Result(code) if sender == self.bbmd => match code {
                BvlcResultCode::Successful => {
                    if self.status != RegistrationStatus::Registered {
                        log::info!("registered with BBMD {}", self.bbmd);
                    }
                    if self.status != RegistrationStatus::Unregistered {
                        self.status = RegistrationStatus::Registered;
                    }
                }
                nak => {
                    log::warn!("BBMD {} refused registration: {nak:?}", self.bbmd);
                    self.status = RegistrationStatus::Failed(nak);
                }
            },
            Bvll::Result(code) => log::debug!("BVLC result {code:?} from {sender}"),
            Bvll::OriginalUnicastNpdu(npdu) => deliver(io, sender, self.station.address(), npdu),
            Bvll::ForwardedNpdu { origin, npdu } => {
                deliver(io, origin, Address::LocalBroadcast, npdu)
            }
            Bvll::OriginalBroadcastNpdu(_) => {
                log::debug!("foreign device ignores local broadcast from {sender}")
            }
            other => nak(io, sender, other.function()),
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut LayerIo) {
        if token == REGISTRATION_TIMER {
            self.send_registration(io, self.ttl);
        }
    }
}
