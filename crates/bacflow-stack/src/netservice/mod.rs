//! Network layer: adapters, routing and the network service element.
//!
//! [`Nsap`] sits between the application layers and one B/IP layer per
//! adapter; adapter `n` is bound as lower port `n`. With one adapter it is
//! a plain device network layer, with several it routes between them.

mod element;
mod routing;

pub use routing::{PendingNpdus, RouterReference, RoutingTable};

use crate::config::NsapConfig;
use crate::error::ConfigError;
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::npdu::{NetAddress, NetworkMessage, Npdu, DEFAULT_HOP_COUNT, GLOBAL_NETWORK};
use bacflow_core::{Address, EncodeError, Pdu};

/// One attached network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    network: Option<u16>,
    /// Whether the network number came from configuration rather than
    /// Network-Number-Is.
    configured: bool,
    address: Address,
}

impl Adapter {
    pub fn network(&self) -> Option<u16> {
        self.network
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Our own station address on this network.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

fn discovery_token(network: u16) -> u64 {
    u64::from(network)
}

/// Router hops an NPDU has crossed to reach us, counting the last one.
fn distance(npdu: &Npdu) -> u8 {
    let crossed = DEFAULT_HOP_COUNT.saturating_sub(npdu.hop_count.unwrap_or(DEFAULT_HOP_COUNT));
    crossed.saturating_add(1)
}

fn station(mac: &[u8]) -> Address {
    if mac.is_empty() {
        Address::LocalBroadcast
    } else {
        Address::LocalStation(mac.to_vec())
    }
}

#[derive(Debug)]
pub struct Nsap {
    config: NsapConfig,
    adapters: Vec<Adapter>,
    local_adapter: Option<usize>,
    routes: RoutingTable,
    pending: PendingNpdus,
}

impl Nsap {
    pub fn new(config: NsapConfig) -> Self {
        let pending = PendingNpdus::new(config.pending_queue_limit);
        Self {
            config,
            adapters: Vec::new(),
            local_adapter: None,
            routes: RoutingTable::new(),
            pending,
        }
    }

    /// Attaches a network and returns its port. `network` may be unknown
    /// and learned later from Network-Number-Is.
    pub fn add_adapter(&mut self, network: Option<u16>, address: Address) -> Result<usize, ConfigError> {
        if let Some(net) = network {
            if net == 0 || net == GLOBAL_NETWORK {
                return Err(ConfigError::InvalidNetwork(net));
            }
            if self.adapter_for_network(net).is_some() {
                return Err(ConfigError::DuplicateNetwork(net));
            }
            self.routes.remove(net);
        }
        self.adapters.push(Adapter {
            network,
            configured: network.is_some(),
            address,
        });
        Ok(self.adapters.len() - 1)
    }

    /// Selects the adapter the local application lives on.
    pub fn set_local_adapter(&mut self, port: usize) -> Result<(), ConfigError> {
        if port >= self.adapters.len() {
            return Err(ConfigError::UnknownAdapterPort(port));
        }
        self.local_adapter = Some(port);
        Ok(())
    }

    pub fn local_adapter(&self) -> Option<usize> {
        self.local_adapter
    }

    pub fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    pub fn is_router(&self) -> bool {
        self.adapters.len() > 1
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Seeds a route by hand.
    pub fn add_route(&mut self, network: u16, port: usize, router: Address) -> Result<(), ConfigError> {
        if network == 0 || network == GLOBAL_NETWORK {
            return Err(ConfigError::InvalidNetwork(network));
        }
        if port >= self.adapters.len() {
            return Err(ConfigError::UnknownAdapterPort(port));
        }
        if self.adapter_for_network(network).is_some() {
            return Err(ConfigError::DuplicateNetwork(network));
        }
        self.routes.insert(network, RouterReference::new(port, router));
        Ok(())
    }

    /// Forgets every route to `network`.
    pub fn remove_route(&mut self, network: u16) -> Vec<RouterReference> {
        self.routes.remove(network)
    }

    pub fn pending_len(&self, network: u16) -> usize {
        self.pending.len(network)
    }

    /// Sends a network-layer message out of `port` to a station or
    /// broadcast on that adapter.
    pub fn send_network_message(
        &self,
        port: usize,
        destination: Address,
        message: &NetworkMessage,
        io: &mut LayerIo,
    ) -> Result<(), EncodeError> {
        let npdu = Npdu::network(message)?;
        self.send(io, port, destination, &npdu);
        Ok(())
    }

    /// Broadcasts Who-Is-Router-To-Network on every adapter.
    pub fn who_is_router_to_network(&self, network: Option<u16>, io: &mut LayerIo) {
        self.broadcast_message(io, None, &NetworkMessage::WhoIsRouterToNetwork(network));
    }

    fn adapter_for_network(&self, network: u16) -> Option<usize> {
        self.adapters
            .iter()
            .position(|adapter| adapter.network == Some(network))
    }

    /// SNET/SADR naming station `mac` on adapter `port`.
    fn source_on(&self, port: usize, mac: &[u8]) -> Option<NetAddress> {
        let network = self.adapters.get(port)?.network?;
        if mac.is_empty() {
            return None;
        }
        Some(NetAddress::new(network, mac))
    }

    fn local_source(&self) -> Option<NetAddress> {
        let port = self.local_adapter?;
        let mac = self.adapters.get(port)?.address.mac()?;
        self.source_on(port, mac)
    }

    /// Networks a requester on `port` can reach through us.
    fn reachable_from(&self, port: usize) -> Vec<u16> {
        let mut networks: Vec<u16> = self
            .adapters
            .iter()
            .enumerate()
            .filter(|(p, _)| *p != port)
            .filter_map(|(_, adapter)| adapter.network)
            .collect();
        if self.is_router() {
            networks.extend(
                self.routes
                    .iter()
                    .filter(|(_, reference)| reference.port != port)
                    .map(|(net, _)| net),
            );
        }
        networks.sort_unstable();
        networks.dedup();
        networks
    }

    fn send(&self, io: &mut LayerIo, port: usize, destination: Address, npdu: &Npdu) {
        match npdu.to_vec() {
            Ok(bytes) => io.request_on(
                port,
                Pdu::new(bytes)
                    .with_destination(destination)
                    .with_expecting_reply(npdu.expecting_reply)
                    .with_priority(npdu.priority),
            ),
            Err(err) => log::warn!("cannot encode NPDU for {destination}: {err}"),
        }
    }

    fn broadcast_message(&self, io: &mut LayerIo, except: Option<usize>, message: &NetworkMessage) {
        let npdu = match Npdu::network(message) {
            Ok(npdu) => npdu,
            Err(err) => {
                log::warn!("cannot encode network message: {err}");
                return;
            }
        };
        for port in 0..self.adapters.len() {
            if Some(port) != except {
                self.send(io, port, Address::LocalBroadcast, &npdu);
            }
        }
    }

    /// Sends `npdu` toward `network`: directly when attached, through a
    /// router when one is known, otherwise queued behind a router search.
    fn route_out(&mut self, io: &mut LayerIo, destination: NetAddress, mut npdu: Npdu, arrival: Option<usize>) {
        let network = destination.network;
        if let Some(port) = self.adapter_for_network(network) {
            if Some(port) == arrival {
                log::debug!("not forwarding NPDU for network {network} back where it came from");
                return;
            }
            if arrival.is_none() && Some(port) != self.local_adapter && npdu.source.is_none() {
                npdu.source = self.local_source();
            }
            npdu.destination = None;
            npdu.hop_count = None;
            self.send(io, port, station(&destination.mac), &npdu);
            return;
        }

        let npdu = npdu.with_destination(destination);
        let mut known = self.routes.on_network(network).peekable();
        let any_known = known.peek().is_some();
        let route = known
            .filter(|route| Some(route.port) != arrival)
            .min_by_key(|route| (route.busy, route.hops, route.port))
            .cloned();
        if any_known && route.is_none() {
            log::debug!("only route to network {network} points back at the arrival port");
            return;
        }
        match route {
            Some(route) if !route.busy => {
                let mut npdu = npdu;
                if arrival.is_none() && Some(route.port) != self.local_adapter && npdu.source.is_none() {
                    npdu.source = self.local_source();
                }
                self.send(io, route.port, route.router, &npdu);
            }
            Some(_) => {
                log::debug!("router to network {network} is busy, queueing");
                if self.pending.push(network, npdu) {
                    io.schedule_after(discovery_token(network), self.config.router_discovery_wait);
                }
            }
            None => {
                if self.pending.push(network, npdu) {
                    log::debug!("no route to network {network}, looking for a router");
                    io.schedule_after(discovery_token(network), self.config.router_discovery_wait);
                    self.broadcast_message(io, arrival, &NetworkMessage::WhoIsRouterToNetwork(Some(network)));
                }
            }
        }
    }

    /// Sends whatever waited for `network` now that a usable route exists.
    fn flush(&mut self, io: &mut LayerIo, network: u16) {
        let Some(route) = self.routes.get(network).filter(|route| !route.busy).cloned() else {
            return;
        };
        let queued = self.pending.take(network);
        if queued.is_empty() {
            return;
        }
        io.cancel(discovery_token(network));
        log::debug!("sending {} queued NPDUs to network {network}", queued.len());
        for npdu in &queued {
            self.send(io, route.port, route.router.clone(), npdu);
        }
    }

    /// Passes a received NPDU on toward its DNET.
    fn forward(&mut self, io: &mut LayerIo, arrival: usize, sender: &Address, mut npdu: Npdu) {
        if !self.is_router() {
            log::trace!("not a router, dropping NPDU for {:?}", npdu.destination);
            return;
        }
        let hops = npdu.hop_count.unwrap_or(DEFAULT_HOP_COUNT);
        if hops <= 1 {
            log::warn!("hop count exhausted, dropping NPDU from {sender}");
            return;
        }
        npdu.hop_count = Some(hops - 1);
        if npdu.source.is_none() {
            let Some(source) = sender.mac().and_then(|mac| self.source_on(arrival, mac)) else {
                log::warn!("cannot forward from {sender}: adapter {arrival} has no network number");
                return;
            };
            npdu.source = Some(source);
        }
        let Some(destination) = npdu.destination.clone() else {
            return;
        };
        if destination.network == GLOBAL_NETWORK {
            for port in 0..self.adapters.len() {
                if port != arrival {
                    self.send(io, port, Address::LocalBroadcast, &npdu);
                }
            }
            return;
        }
        self.route_out(io, destination, npdu, Some(arrival));
    }

    fn deliver(&mut self, io: &mut LayerIo, port: usize, sender: &Address, source: Address, destination: Address, npdu: &Npdu) {
        if npdu.network_message {
            self.network_message(port, sender, npdu, io);
            return;
        }
        io.response(
            Pdu::new(npdu.payload.clone())
                .with_source(source)
                .with_destination(destination)
                .with_expecting_reply(npdu.expecting_reply)
                .with_priority(npdu.priority),
        );
    }
}

impl Layer for Nsap {
    fn name(&self) -> &'static str {
        "nsap"
    }

    fn start(&mut self, io: &mut LayerIo) {
        if !self.is_router() {
            return;
        }
        for port in 0..self.adapters.len() {
            let networks = self.reachable_from(port);
            if networks.is_empty() {
                continue;
            }
            if let Err(err) = self.send_network_message(
                port,
                Address::LocalBroadcast,
                &NetworkMessage::IAmRouterToNetwork(networks),
                io,
            ) {
                log::warn!("cannot announce routes on port {port}: {err}");
            }
        }
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        let Some(local) = self.local_adapter else {
            log::warn!("no local adapter, dropping APDU for {}", pdu.destination);
            return;
        };
        let Pdu {
            destination,
            expecting_reply,
            network_priority,
            data,
            ..
        } = pdu;
        let mut npdu = Npdu::apdu(data);
        npdu.expecting_reply = expecting_reply;
        npdu.priority = network_priority;

        match destination {
            Address::LocalStation(_) | Address::LocalBroadcast => self.send(io, local, destination, &npdu),
            Address::RemoteStation { net, addr } => self.route_out(io, NetAddress::new(net, addr), npdu, None),
            Address::RemoteBroadcast { net } => self.route_out(io, NetAddress::broadcast(net), npdu, None),
            Address::GlobalBroadcast => {
                let npdu = npdu.with_destination(NetAddress::broadcast(GLOBAL_NETWORK));
                let local_source = self.local_source();
                for port in 0..self.adapters.len() {
                    let mut out = npdu.clone();
                    if port != local {
                        out.source = local_source.clone();
                    }
                    self.send(io, port, Address::LocalBroadcast, &out);
                }
            }
            Address::Null => log::warn!("APDU without a destination dropped"),
        }
    }

    fn confirmation(&mut self, port: usize, pdu: Pdu, io: &mut LayerIo) {
        let npdu = match Npdu::decode(&pdu.data) {
            Ok(npdu) => npdu,
            Err(err) => {
                log::warn!("dropping malformed NPDU from {}: {err}", pdu.source);
                return;
            }
        };
        let Some(adapter) = self.adapters.get(port) else {
            log::warn!("NPDU on unknown adapter port {port}");
            return;
        };
        let own_mac = adapter.address.mac().map(<[u8]>::to_vec);
        let arrival_network = adapter.network;

        if let Some(snet) = &npdu.source {
            let reference = RouterReference::new(port, pdu.source.clone()).with_hops(distance(&npdu));
            if self.adapter_for_network(snet.network).is_none() && self.routes.insert(snet.network, reference) {
                log::debug!("learned route to network {} via {}", snet.network, pdu.source);
            }
            self.flush(io, snet.network);
        }

        let source = match (&npdu.source, arrival_network) {
            (Some(snet), _) => Address::RemoteStation {
                net: snet.network,
                addr: snet.mac.clone(),
            },
            (None, Some(net)) if Some(port) != self.local_adapter => Address::RemoteStation {
                net,
                addr: pdu.source.mac().map(<[u8]>::to_vec).unwrap_or_default(),
            },
            (None, _) => pdu.source.clone(),
        };

        let Some(destination) = npdu.destination.clone() else {
            if npdu.network_message || Some(port) == self.local_adapter {
                self.deliver(io, port, &pdu.source, source, pdu.destination.clone(), &npdu);
            } else {
                log::trace!("APDU on non-local adapter {port} dropped");
            }
            return;
        };

        if destination.network == GLOBAL_NETWORK {
            if self.local_adapter.is_some() {
                self.deliver(io, port, &pdu.source, source, Address::GlobalBroadcast, &npdu);
            }
            self.forward(io, port, &pdu.source, npdu);
            return;
        }

        let target = self.adapter_for_network(destination.network);
        let for_us = destination.mac.is_empty() || Some(&destination.mac) == own_mac.as_ref();
        if target.is_some() && target == self.local_adapter && for_us {
            let seen_as = if destination.mac.is_empty() {
                Address::RemoteBroadcast {
                    net: destination.network,
                }
            } else {
                Address::LocalStation(destination.mac.clone())
            };
            self.deliver(io, port, &pdu.source, source, seen_as, &npdu);
            if destination.mac.is_empty() && target != Some(port) {
                self.forward(io, port, &pdu.source, npdu);
            }
            return;
        }
        if target == Some(port) {
            log::debug!("NPDU for our own network {} from {}, ignored", destination.network, pdu.source);
            return;
        }
        self.forward(io, port, &pdu.source, npdu);
    }

    fn on_timer(&mut self, token: u64, _io: &mut LayerIo) {
        let Ok(network) = u16::try_from(token) else {
            return;
        };
        let dropped = self.pending.take(network).len();
        if dropped > 0 {
            log::warn!("network {network} unreachable, dropped {dropped} queued NPDUs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Nsap;
    use crate::config::NsapConfig;
    use crate::error::ConfigError;
    use bacflow_core::comm::{Layer, LayerIo, Stack};
    use bacflow_core::npdu::{NetAddress, NetworkMessage, Npdu};
    use bacflow_core::{Address, Pdu};
    use std::time::{Duration, Instant};

    /// Stands in for a B/IP layer: everything requested is transmitted,
    /// everything received goes straight up.
    struct Wire;

    impl Layer for Wire {
        fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
            io.request(pdu);
        }

        fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
            io.response(pdu);
        }
    }

    fn mac(n: u8) -> Address {
        Address::local_station(vec![n])
    }

    #[test]
    fn duplicate_networks_are_configuration_errors() {
        let mut nsap = Nsap::new(NsapConfig::default());
        nsap.add_adapter(Some(1), mac(1)).unwrap();
        assert_eq!(nsap.add_adapter(Some(1), mac(2)), Err(ConfigError::DuplicateNetwork(1)));
        assert_eq!(nsap.add_adapter(Some(0), mac(2)), Err(ConfigError::InvalidNetwork(0)));
        assert_eq!(nsap.set_local_adapter(4), Err(ConfigError::UnknownAdapterPort(4)));
        assert_eq!(nsap.add_route(1, 0, mac(9)), Err(ConfigError::DuplicateNetwork(1)));
    }

    #[test]
    fn unknown_network_is_queued_then_dropped() {
        let t0 = Instant::now();
        let mut stack = Stack::new(t0);
        let mut nsap = Nsap::new(NsapConfig::default().with_router_discovery_wait(Duration::from_secs(5)));
        nsap.add_adapter(None, mac(1)).unwrap();
        nsap.set_local_adapter(0).unwrap();
        let nsap = stack.add(nsap);
        let wire = stack.add(Wire);
        stack.bind(&[nsap, wire]).unwrap();

        let dest = Address::remote_station(7, vec![3]).unwrap();
        stack.request(nsap, Pdu::new(vec![0x10, 0x08]).with_destination(dest.clone()));
        stack.request(nsap, Pdu::new(vec![0x10, 0x08]).with_destination(dest));

        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1, "one router search for two NPDUs");
        let npdu = Npdu::decode(&sent[0].1.data).unwrap();
        assert_eq!(
            npdu.network_message().unwrap(),
            Some(NetworkMessage::WhoIsRouterToNetwork(Some(7)))
        );
        assert_eq!(stack.layer::<Nsap>(nsap).unwrap().pending_len(7), 2);

        stack.advance(t0 + Duration::from_secs(5));
        assert_eq!(stack.layer::<Nsap>(nsap).unwrap().pending_len(7), 0);
        assert!(stack.take_transmits().is_empty());
    }

    #[test]
    fn i_am_router_releases_the_queue() {
        let mut stack = Stack::new(Instant::now());
        let mut nsap = Nsap::new(NsapConfig::default());
        nsap.add_adapter(None, mac(1)).unwrap();
        nsap.set_local_adapter(0).unwrap();
        let nsap = stack.add(nsap);
        let wire = stack.add(Wire);
        stack.bind(&[nsap, wire]).unwrap();

        let dest = Address::remote_station(7, vec![3]).unwrap();
        stack.request(nsap, Pdu::new(vec![0x10, 0x08]).with_destination(dest));
        stack.take_transmits();

        let i_am = Npdu::network(&NetworkMessage::IAmRouterToNetwork(vec![7, 8])).unwrap();
        stack.receive(wire, Pdu::new(i_am.to_vec().unwrap()).with_source(mac(0x20)));

        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.destination, mac(0x20));
        let npdu = Npdu::decode(&sent[0].1.data).unwrap();
        assert_eq!(npdu.destination, Some(NetAddress::new(7, vec![3])));
        assert_eq!(npdu.hop_count, Some(255));
        let routes = stack.layer::<Nsap>(nsap).unwrap().routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.get(8).map(|r| r.router.clone()), Some(mac(0x20)));
    }

    #[test]
    fn routed_apdu_surfaces_with_remote_source() {
        let mut stack = Stack::new(Instant::now());
        let mut nsap = Nsap::new(NsapConfig::default());
        nsap.add_adapter(Some(1), mac(1)).unwrap();
        nsap.set_local_adapter(0).unwrap();
        let nsap = stack.add(nsap);
        let wire = stack.add(Wire);
        stack.bind(&[nsap, wire]).unwrap();

        let npdu = Npdu::apdu(vec![0x10, 0x08]).with_source(NetAddress::new(9, vec![0x44]));
        stack.receive(
            wire,
            Pdu::new(npdu.to_vec().unwrap())
                .with_source(mac(0x20))
                .with_destination(Address::LocalBroadcast),
        );

        let up = stack.take_deliveries();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].1.source, Address::remote_station(9, vec![0x44]).unwrap());
        assert_eq!(up[0].1.data, vec![0x10, 0x08]);
        let routes = stack.layer::<Nsap>(nsap).unwrap().routes();
        assert_eq!(routes.get(9).map(|r| r.router.clone()), Some(mac(0x20)));
    }

    #[test]
    fn busy_router_hands_over_to_the_other_adapter() {
        let mut stack = Stack::new(Instant::now());
        let mut nsap = Nsap::new(NsapConfig::default());
        nsap.add_adapter(Some(1), mac(1)).unwrap();
        nsap.add_adapter(Some(2), mac(2)).unwrap();
        nsap.set_local_adapter(0).unwrap();
        let nsap = stack.add(nsap);
        let wire0 = stack.add(Wire);
        let wire1 = stack.add(Wire);
        stack.bind_port(nsap, 0, wire0).unwrap();
        stack.bind_port(nsap, 1, wire1).unwrap();

        let i_am = Npdu::network(&NetworkMessage::IAmRouterToNetwork(vec![9])).unwrap();
        stack.receive(wire0, Pdu::new(i_am.to_vec().unwrap()).with_source(mac(0x10)));
        stack.receive(wire1, Pdu::new(i_am.to_vec().unwrap()).with_source(mac(0x20)));
        stack.take_transmits();

        let routes = stack.layer::<Nsap>(nsap).unwrap().routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.get_on(9, 0).map(|r| r.router.clone()), Some(mac(0x10)));
        assert_eq!(routes.get_on(9, 1).map(|r| r.router.clone()), Some(mac(0x20)));

        let dest = Address::remote_station(9, vec![3]).unwrap();
        stack.request(nsap, Pdu::new(vec![0x10, 0x08]).with_destination(dest.clone()));
        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].0, sent[0].1.destination.clone()), (wire0, mac(0x10)));

        let busy = Npdu::network(&NetworkMessage::RouterBusyToNetwork(vec![9])).unwrap();
        stack.receive(wire0, Pdu::new(busy.to_vec().unwrap()).with_source(mac(0x10)));
        stack.request(nsap, Pdu::new(vec![0x10, 0x08]).with_destination(dest));
        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].0, sent[0].1.destination.clone()), (wire1, mac(0x20)));
        assert_eq!(stack.layer::<Nsap>(nsap).unwrap().pending_len(9), 0);
    }

    #[test]
    fn malformed_npdu_is_dropped() {
        let mut stack = Stack::new(Instant::now());
        let mut nsap = Nsap::new(NsapConfig::default());
        nsap.add_adapter(Some(1), mac(1)).unwrap();
        nsap.set_local_adapter(0).unwrap();
        let nsap = stack.add(nsap);
        let wire = stack.add(Wire);
        stack.bind(&[nsap, wire]).unwrap();

        stack.receive(wire, Pdu::new(vec![0x02, 0x00]).with_source(mac(3)));
        assert!(stack.take_deliveries().is_empty());
        assert!(stack.take_transmits().is_empty());
    }
}
