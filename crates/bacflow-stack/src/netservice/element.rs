//! Network service element: answers and learns from network-layer messages.

use super::{distance, Nsap, RouterReference};
use bacflow_core::comm::LayerIo;
use bacflow_core::npdu::{NetworkMessage, Npdu, RoutingTableEntry};
use bacflow_core::Address;

impl Nsap {
    pub(super) fn network_message(&mut self, port: usize, sender: &Address, npdu: &Npdu, io: &mut LayerIo) {
        let message = match npdu.network_message() {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                log::debug!(
                    "dropping network message {:?} from {sender}: {err}",
                    npdu.message_type
                );
                return;
            }
        };
        log::trace!("port {port}: {message:?} from {sender}");

        match message {
            NetworkMessage::WhoIsRouterToNetwork(network) => {
                self.who_is_router(port, sender, npdu, network, io)
            }
            NetworkMessage::IAmRouterToNetwork(networks) => {
                self.i_am_router(port, sender, &networks, distance(npdu), io)
            }
            NetworkMessage::ICouldBeRouterToNetwork {
                network,
                performance_index,
            } => log::debug!(
                "{sender} could be a router to network {network} (performance {performance_index})"
            ),
            NetworkMessage::RejectMessageToNetwork { reason, network } => {
                log::warn!("{sender} rejected a message to network {network}: {reason}");
                if let Some(route) = self.routes.remove_via(network, sender) {
                    log::debug!("route to network {network} on port {} dropped", route.port);
                }
            }
            NetworkMessage::RouterBusyToNetwork(networks) => {
                let touched = self.routes.set_busy(sender, &networks, true);
                log::debug!("{sender} busy for networks {touched:?}");
            }
            NetworkMessage::RouterAvailableToNetwork(networks) => {
                let touched = self.routes.set_busy(sender, &networks, false);
                for network in touched {
                    self.flush(io, network);
                }
            }
            NetworkMessage::InitializeRoutingTable(entries) => {
                self.initialize_routing_table(port, sender, npdu, &entries, io)
            }
            NetworkMessage::InitializeRoutingTableAck(entries) => {
                let hops = distance(npdu);
                for entry in &entries {
                    self.learn(port, sender, entry.network, hops, io);
                }
            }
            NetworkMessage::EstablishConnectionToNetwork {
                network,
                termination_time,
            } => log::debug!(
                "ignoring establish-connection to network {network} ({termination_time}s) from {sender}"
            ),
            NetworkMessage::DisconnectConnectionToNetwork(network) => {
                log::debug!("ignoring disconnect-connection to network {network} from {sender}")
            }
            NetworkMessage::WhatIsNetworkNumber => {
                if npdu.source.is_some() || npdu.destination.is_some() {
                    return;
                }
                if let Some(network) = self.adapters.get(port).and_then(|a| a.network) {
                    let configured = self.adapters[port].configured;
                    self.broadcast_on(
                        io,
                        port,
                        &NetworkMessage::NetworkNumberIs {
                            network,
                            configured,
                        },
                    );
                }
            }
            NetworkMessage::NetworkNumberIs {
                network,
                configured,
            } => self.network_number_is(port, sender, npdu, network, configured),
            NetworkMessage::Proprietary {
                message_type,
                vendor_id,
                data,
            } => log::debug!(
                "proprietary network message {message_type:#04x} (vendor {vendor_id}, {} octets) from {sender}",
                data.len()
            ),
        }
    }

    fn who_is_router(
        &mut self,
        port: usize,
        sender: &Address,
        npdu: &Npdu,
        network: Option<u16>,
        io: &mut LayerIo,
    ) {
        let reachable = self.reachable_from(port);
        let answer = match network {
            None if !reachable.is_empty() => Some(reachable),
            Some(net) if reachable.contains(&net) => Some(vec![net]),
            _ => None,
        };
        if let Some(networks) = answer {
            let message = NetworkMessage::IAmRouterToNetwork(networks);
            match npdu.source {
                Some(_) => self.reply(io, port, sender, npdu, &message),
                None => self.broadcast_on(io, port, &message),
            }
            return;
        }
        match network {
            Some(net) if self.is_router() => {
                log::debug!("no route to network {net}, asking the other ports");
                self.broadcast_message(io, Some(port), &NetworkMessage::WhoIsRouterToNetwork(Some(net)));
            }
            _ => {}
        }
    }

    fn i_am_router(&mut self, port: usize, sender: &Address, networks: &[u16], hops: u8, io: &mut LayerIo) {
        let learned: Vec<u16> = networks
            .iter()
            .copied()
            .filter(|network| self.learn(port, sender, *network, hops, io))
            .collect();
        if !learned.is_empty() && self.is_router() {
            self.broadcast_message(io, Some(port), &NetworkMessage::IAmRouterToNetwork(learned));
        }
    }

    /// Records that `sender` on `port` reaches `network`; `true` when the
    /// table changed.
    fn learn(&mut self, port: usize, sender: &Address, network: u16, hops: u8, io: &mut LayerIo) -> bool {
        if self.adapter_for_network(network).is_some() {
            return false;
        }
        let changed = self
            .routes
            .insert(network, RouterReference::new(port, sender.clone()).with_hops(hops));
        if changed {
            log::debug!("route to network {network} via {sender} on port {port}");
        }
        self.flush(io, network);
        changed
    }

    fn initialize_routing_table(
        &mut self,
        port: usize,
        sender: &Address,
        npdu: &Npdu,
        entries: &[RoutingTableEntry],
        io: &mut LayerIo,
    ) {
        if entries.is_empty() {
            let table = self.routing_table_entries();
            self.reply(io, port, sender, npdu, &NetworkMessage::InitializeRoutingTableAck(table));
            return;
        }
        let hops = distance(npdu);
        for entry in entries {
            if entry.port_id == 0 {
                if !self.routes.remove(entry.network).is_empty() {
                    log::debug!("route to network {} removed by {sender}", entry.network);
                }
            } else {
                self.learn(port, sender, entry.network, hops, io);
            }
        }
        self.reply(io, port, sender, npdu, &NetworkMessage::InitializeRoutingTableAck(Vec::new()));
    }

    /// Our reachable networks as Initialize-Routing-Table-Ack rows; port
    /// ids are adapter ports counted from one.
    fn routing_table_entries(&self) -> Vec<RoutingTableEntry> {
        let port_id = |port: usize| u8::try_from(port + 1).unwrap_or(u8::MAX);
        let attached = self
            .adapters
            .iter()
            .enumerate()
            .filter_map(|(port, adapter)| Some((adapter.network?, port)));
        let routed = self.routes.iter().map(|(network, route)| (network, route.port));
        attached
            .chain(routed)
            .map(|(network, port)| RoutingTableEntry {
                network,
                port_id: port_id(port),
                port_info: Vec::new(),
            })
            .collect()
    }

    fn network_number_is(&mut self, port: usize, sender: &Address, npdu: &Npdu, network: u16, configured: bool) {
        if npdu.source.is_some() || npdu.destination.is_some() {
            return;
        }
        let Some(adapter) = self.adapters.get_mut(port) else {
            return;
        };
        match adapter.network {
            None => {
                log::info!("port {port} learned network number {network} from {sender}");
                adapter.network = Some(network);
                self.routes.remove(network);
            }
            Some(current) if current != network && configured => log::warn!(
                "{sender} says port {port} is network {network}, configured as {current}"
            ),
            Some(_) => {}
        }
    }

    /// Answers `request`, routing back through `sender` when it came from
    /// another network.
    fn reply(&self, io: &mut LayerIo, port: usize, sender: &Address, request: &Npdu, message: &NetworkMessage) {
        let npdu = match Npdu::network(message) {
            Ok(npdu) => npdu,
            Err(err) => {
                log::warn!("cannot encode {message:?}: {err}");
                return;
            }
        };
        match &request.source {
            Some(origin) => self.send(io, port, sender.clone(), &npdu.with_destination(origin.clone())),
            None => self.send(io, port, sender.clone(), &npdu),
        }
    }

    fn broadcast_on(&self, io: &mut LayerIo, port: usize, message: &NetworkMessage) {
        if let Err(err) = self.send_network_message(port, Address::LocalBroadcast, message, io) {
            log::warn!("cannot encode {message:?}: {err}");
        }
    }
}
