//! A virtual B/IP wire joining several stacks on virtual time.

#![allow(dead_code)]

use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::{LayerId, Stack};
use bacflow_core::Address;
use std::time::{Duration, Instant};

pub struct Port {
    pub layer: LayerId,
    pub station: Ipv4Station,
}

pub struct Node {
    pub stack: Stack,
    pub ports: Vec<Port>,
}

pub struct Wire {
    pub t0: Instant,
    now: Instant,
    pub nodes: Vec<Node>,
    /// Frames lost so far, by sender station.
    pub dropped: Vec<Ipv4Station>,
    /// When set, frames from this station vanish.
    pub mute: Option<Ipv4Station>,
}

pub fn station(s: &str) -> Ipv4Station {
    s.parse().unwrap()
}

impl Wire {
    pub fn new(t0: Instant) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            t0,
            now: t0,
            nodes: Vec::new(),
            dropped: Vec::new(),
            mute: None,
        }
    }

    pub fn add(&mut self, stack: Stack, ports: Vec<Port>) -> usize {
        self.nodes.push(Node { stack, ports });
        self.nodes.len() - 1
    }

    pub fn stack(&mut self, node: usize) -> &mut Stack {
        &mut self.nodes[node].stack
    }

    pub fn start(&mut self) {
        for node in &mut self.nodes {
            node.stack.start();
        }
        self.settle();
    }

    /// Moves frames until no stack has anything left to send.
    pub fn settle(&mut self) {
        for _ in 0..1000 {
            let mut frames = Vec::new();
            for (index, node) in self.nodes.iter_mut().enumerate() {
                for (bottom, pdu) in node.stack.take_transmits() {
                    let Some(port) = node.ports.iter().find(|p| p.layer == bottom) else {
                        continue;
                    };
                    frames.push((index, port.station, pdu));
                }
                node.stack.take_deliveries();
            }
            if frames.is_empty() {
                return;
            }
            for (from, sender, pdu) in frames {
                if self.mute == Some(sender) {
                    self.dropped.push(sender);
                    continue;
                }
                let Some(to) = pdu.destination.socket_addr() else {
                    continue;
                };
                let pdu = pdu.with_source(Address::from_socket_addr(sender.addr));
                for (index, node) in self.nodes.iter_mut().enumerate() {
                    for port in &node.ports {
                        let unicast = port.station.addr == to;
                        let broadcast = index != from
                            && to == sender.broadcast()
                            && port.station.broadcast() == to;
                        if unicast || broadcast {
                            node.stack.receive(port.layer, pdu.clone());
                        }
                    }
                }
            }
        }
        panic!("the wire never went quiet");
    }

    /// Advances every stack to `t0 + offset`, settling after each step.
    pub fn run_until(&mut self, offset: Duration) {
        let end = self.t0 + offset;
        loop {
            let next = self
                .nodes
                .iter_mut()
                .filter_map(|node| node.stack.next_deadline())
                .min();
            match next {
                Some(at) if at <= end => {
                    self.now = self.now.max(at);
                    for node in &mut self.nodes {
                        node.stack.advance(self.now);
                    }
                    self.settle();
                }
                _ => break,
            }
        }
        self.now = end;
        for node in &mut self.nodes {
            node.stack.advance(end);
        }
        self.settle();
    }
}
