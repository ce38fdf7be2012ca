//! Router references and the queue of NPDUs waiting for one.

use bacflow_core::npdu::Npdu;
use bacflow_core::Address;
use std::collections::{BTreeMap, VecDeque};

/// The router that reaches a network, seen from one of our adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterReference {
    /// Adapter the router sits on.
    pub port: usize,
    /// The router's station address on that adapter.
    pub router: Address,
    /// Router hops to the network as far as we can tell; 1 when the
    /// router is directly attached to it or the distance is unknown.
    pub hops: u8,
    /// Set by Router-Busy-To-Network until Router-Available-To-Network.
    pub busy: bool,
}

impl RouterReference {
    pub fn new(port: usize, router: Address) -> Self {
        Self {
            port,
            router,
            hops: 1,
            busy: false,
        }
    }

    pub fn with_hops(mut self, hops: u8) -> Self {
        self.hops = hops.max(1);
        self
    }
}

/// Router references per adapter: at most one per (network, port).
/// Entries are never aged out; they change only on protocol traffic or
/// explicit calls.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<(u16, usize), RouterReference>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of references, counting each adapter separately.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Best reference to `network`: available before busy, then fewest
    /// hops, then lowest port.
    pub fn get(&self, network: u16) -> Option<&RouterReference> {
        self.on_network(network)
            .min_by_key(|reference| (reference.busy, reference.hops, reference.port))
    }

    /// The reference to `network` held for adapter `port`.
    pub fn get_on(&self, network: u16, port: usize) -> Option<&RouterReference> {
        self.routes.get(&(network, port))
    }

    /// Every reference to `network`, in port order.
    pub fn on_network(&self, network: u16) -> impl Iterator<Item = &RouterReference> + '_ {
        self.routes
            .range((network, 0)..=(network, usize::MAX))
            .map(|(_, reference)| reference)
    }

    /// Adds the reference for its adapter, replacing a different router
    /// there; `true` when the router for that adapter changed.
    pub fn insert(&mut self, network: u16, reference: RouterReference) -> bool {
        match self.routes.get_mut(&(network, reference.port)) {
            Some(existing) if existing.router == reference.router => {
                existing.hops = reference.hops;
                false
            }
            Some(existing) => {
                *existing = reference;
                true
            }
            None => {
                self.routes.insert((network, reference.port), reference);
                true
            }
        }
    }

    /// Drops every reference to `network`.
    pub fn remove(&mut self, network: u16) -> Vec<RouterReference> {
        let ports: Vec<usize> = self.on_network(network).map(|reference| reference.port).collect();
        ports
            .into_iter()
            .filter_map(|port| self.routes.remove(&(network, port)))
            .collect()
    }

    /// Drops the reference to `network` through `router`, wherever it sits.
    pub fn remove_via(&mut self, network: u16, router: &Address) -> Option<RouterReference> {
        let port = self
            .on_network(network)
            .find(|reference| &reference.router == router)?
            .port;
        self.routes.remove(&(network, port))
    }

    /// Flags the routes through `router`. An empty `networks` list means
    /// every network behind that router. Returns the networks touched.
    pub fn set_busy(&mut self, router: &Address, networks: &[u16], busy: bool) -> Vec<u16> {
        let mut touched = Vec::new();
        for ((network, _), reference) in &mut self.routes {
            if &reference.router != router {
                continue;
            }
            if networks.is_empty() || networks.contains(network) {
                reference.busy = busy;
                if !touched.contains(network) {
                    touched.push(*network);
                }
            }
        }
        touched
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &RouterReference)> + '_ {
        self.routes.iter().map(|((net, _), reference)| (*net, reference))
    }
}

/// NPDUs held per destination network while a router is searched for.
#[derive(Debug, Clone)]
pub struct PendingNpdus {
    limit: usize,
    queues: BTreeMap<u16, VecDeque<Npdu>>,
}

impl PendingNpdus {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            queues: BTreeMap::new(),
        }
    }

    /// Queues `npdu`; `true` when this starts a new search for `network`.
    pub fn push(&mut self, network: u16, npdu: Npdu) -> bool {
        let limit = self.limit;
        let mut started = false;
        let queue = self.queues.entry(network).or_insert_with(|| {
            started = true;
            VecDeque::new()
        });
        if queue.len() >= limit {
            queue.pop_front();
            log::debug!("pending queue for network {network} full, dropped oldest");
        }
        queue.push_back(npdu);
        started
    }

    pub fn take(&mut self, network: u16) -> Vec<Npdu> {
        self.queues
            .remove(&network)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn len(&self, network: u16) -> usize {
        self.queues.get(&network).map_or(0, VecDeque::len)
    }

    pub fn is_waiting(&self, network: u16) -> bool {
        self.queues.contains_key(&network)
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingNpdus, RouterReference, RoutingTable};
    use bacflow_core::npdu::Npdu;
    use bacflow_core::Address;

    #[test]
    fn insert_reports_changes_only() {
        let mut table = RoutingTable::new();
        let r1 = Address::local_station(vec![1]);
        let r2 = Address::local_station(vec![2]);
        assert!(table.insert(7, RouterReference::new(0, r1.clone())));
        assert!(!table.insert(7, RouterReference::new(0, r1.clone()).with_hops(3)));
        assert_eq!(table.get_on(7, 0).map(|r| r.hops), Some(3));
        assert!(table.insert(7, RouterReference::new(0, r2.clone())));
        assert_eq!(table.get_on(7, 0).map(|r| r.router.clone()), Some(r2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn each_adapter_keeps_its_own_route() {
        let mut table = RoutingTable::new();
        let near = Address::local_station(vec![1]);
        let far = Address::local_station(vec![2]);
        table.insert(7, RouterReference::new(0, far.clone()).with_hops(3));
        table.insert(7, RouterReference::new(1, near.clone()));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(7).map(|r| r.port), Some(1));

        // a busy router gives way to the longer path
        table.set_busy(&near, &[7], true);
        assert_eq!(table.get(7).map(|r| r.port), Some(0));

        assert_eq!(table.remove_via(7, &far).map(|r| r.port), Some(0));
        assert_eq!(table.get(7).map(|r| (r.port, r.busy)), Some((1, true)));
        assert_eq!(table.remove(7).len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn busy_applies_to_one_router() {
        let mut table = RoutingTable::new();
        let a = Address::local_station(vec![1]);
        let b = Address::local_station(vec![2]);
        table.insert(1, RouterReference::new(0, a.clone()));
        table.insert(2, RouterReference::new(0, a.clone()));
        table.insert(3, RouterReference::new(0, b));
        assert_eq!(table.set_busy(&a, &[], true), vec![1, 2]);
        assert!(!table.get(3).unwrap().busy);
        assert_eq!(table.set_busy(&a, &[2], false), vec![2]);
        assert!(table.get(1).unwrap().busy);
    }

    #[test]
    fn pending_queue_is_bounded() {
        let mut pending = PendingNpdus::new(2);
        assert!(pending.push(9, Npdu::apdu(vec![1])));
        assert!(!pending.push(9, Npdu::apdu(vec![2])));
        assert!(!pending.push(9, Npdu::apdu(vec![3])));
        assert_eq!(pending.len(9), 2);
        let drained = pending.take(9);
        assert_eq!(drained[0].payload, vec![2]);
        assert!(!pending.is_waiting(9));
    }
}
