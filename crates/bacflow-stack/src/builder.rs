//! Assembles the standard stacks: a device (application over one B/IP
//! port) and a multi-port router.

use crate::app::{Application, LocalDevice, LocalObject};
use crate::appservice::{Asap, DeviceInfoCache, Smap};
use crate::config::{LinkConfig, LocalDeviceConfig, NsapConfig, SmapConfig};
use crate::error::{ConfigError, StackError};
use crate::netservice::Nsap;
use crate::runtime::EventLoop;
use bacflow_core::address::Ipv4Station;
use bacflow_core::comm::{LayerId, Stack};
use bacflow_datalink::{BipBbmd, BipForeign, BipSimple, UdpPort};
use std::time::Instant;

/// Layer ids of an assembled device stack, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStack {
    pub app: LayerId,
    pub asap: LayerId,
    pub smap: LayerId,
    pub nsap: LayerId,
    pub link: LayerId,
}

/// Application → ASAP → SMAP → NSAP → B/IP.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    station: Ipv4Station,
    network: Option<u16>,
    link: LinkConfig,
    device: LocalDeviceConfig,
    smap: SmapConfig,
    nsap: NsapConfig,
    objects: Vec<LocalObject>,
}

impl DeviceBuilder {
    pub fn new(station: Ipv4Station) -> Self {
        Self {
            station,
            network: None,
            link: LinkConfig::default(),
            device: LocalDeviceConfig::default(),
            smap: SmapConfig::default(),
            nsap: NsapConfig::default(),
            objects: Vec::new(),
        }
    }

    /// Network number of the port; left unknown it is learned from
    /// Network-Number-Is.
    pub fn with_network(mut self, network: u16) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    pub fn with_device(mut self, device: LocalDeviceConfig) -> Self {
        self.device = device;
        self
    }

    pub fn with_smap(mut self, smap: SmapConfig) -> Self {
        self.smap = smap;
        self
    }

    pub fn with_nsap(mut self, nsap: NsapConfig) -> Self {
        self.nsap = nsap;
        self
    }

    pub fn with_object(mut self, object: LocalObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn station(&self) -> Ipv4Station {
        self.station
    }

    /// Adds the layers to `stack` and binds them.
    pub fn build(self, stack: &mut Stack) -> Result<DeviceStack, ConfigError> {
        let mut device = LocalDevice::new(&self.device, &self.smap)?;
        for object in self.objects {
            device.add_object(object)?;
        }
        let devices = DeviceInfoCache::new();

        let mut nsap = Nsap::new(self.nsap);
        let port = nsap.add_adapter(self.network, self.station.address())?;
        nsap.set_local_adapter(port)?;

        let app = stack.add(Application::new(device, &self.smap, devices.clone()));
        let asap = stack.add(Asap::new());
        let smap = stack.add(Smap::new(self.smap, devices));
        let nsap = stack.add(nsap);
        let link = add_link(stack, self.station, self.link);
        stack.bind(&[app, asap, smap, nsap, link])?;
        log::debug!("device stack on {} ({link})", self.station);

        Ok(DeviceStack {
            app,
            asap,
            smap,
            nsap,
            link,
        })
    }

    /// Binds the UDP port and builds the stack over it. A zero port in the
    /// station is replaced by the one the socket got.
    pub async fn bind(mut self) -> Result<(EventLoop, DeviceStack), StackError> {
        let udp = UdpPort::bind(self.station.addr).await?;
        self.station.addr = bound_addr(self.station, &udp)?;
        let mut stack = Stack::new(Instant::now());
        let layers = self.build(&mut stack)?;
        let mut event_loop = EventLoop::new(stack);
        event_loop.attach(layers.link, udp);
        Ok((event_loop, layers))
    }
}

fn add_link(stack: &mut Stack, station: Ipv4Station, link: LinkConfig) -> LayerId {
    match link {
        LinkConfig::Simple => stack.add(BipSimple::new(station)),
        LinkConfig::Foreign { bbmd, ttl } => stack.add(BipForeign::new(station, bbmd, ttl)),
        LinkConfig::Bbmd { peers } => stack.add(BipBbmd::new(station).with_peers(peers)),
        LinkConfig::Nat { global, peers } => stack.add(BipBbmd::nat(station, global).with_peers(peers)),
    }
}

fn bound_addr(station: Ipv4Station, udp: &UdpPort) -> Result<std::net::SocketAddrV4, StackError> {
    let local = udp.local_addr()?;
    Ok(if station.addr.port() == 0 {
        std::net::SocketAddrV4::new(*station.addr.ip(), local.port())
    } else {
        station.addr
    })
}

/// One routed port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterPort {
    pub network: u16,
    pub station: Ipv4Station,
    pub link: LinkConfig,
}

impl RouterPort {
    pub fn new(network: u16, station: Ipv4Station) -> Self {
        Self {
            network,
            station,
            link: LinkConfig::Simple,
        }
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }
}

/// Layer ids of an assembled router: the NSAP and one link per port, in
/// port order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStack {
    pub nsap: LayerId,
    pub links: Vec<LayerId>,
}

/// An NSAP over one B/IP layer per network, with no application.
#[derive(Debug, Clone, Default)]
pub struct RouterBuilder {
    ports: Vec<RouterPort>,
    nsap: NsapConfig,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: RouterPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_nsap(mut self, nsap: NsapConfig) -> Self {
        self.nsap = nsap;
        self
    }

    pub fn build(self, stack: &mut Stack) -> Result<RouterStack, ConfigError> {
        let mut nsap = Nsap::new(self.nsap);
        for port in &self.ports {
            nsap.add_adapter(Some(port.network), port.station.address())?;
        }
        let nsap = stack.add(nsap);
        let mut links = Vec::with_capacity(self.ports.len());
        for (index, port) in self.ports.into_iter().enumerate() {
            let link = add_link(stack, port.station, port.link);
            stack.bind_port(nsap, index, link)?;
            log::debug!("router port {index}: network {} on {}", port.network, port.station);
            links.push(link);
        }
        Ok(RouterStack { nsap, links })
    }

    pub async fn bind(mut self) -> Result<(EventLoop, RouterStack), StackError> {
        let mut sockets = Vec::with_capacity(self.ports.len());
        for port in &mut self.ports {
            let udp = UdpPort::bind(port.station.addr).await?;
            port.station.addr = bound_addr(port.station, &udp)?;
            sockets.push(udp);
        }
        let mut stack = Stack::new(Instant::now());
        let layers = self.build(&mut stack)?;
        let mut event_loop = EventLoop::new(stack);
        for (link, udp) in layers.links.iter().zip(sockets) {
            event_loop.attach(*link, udp);
        }
        Ok((event_loop, layers))
    }
}
