//! BACnet addresses and the pattern match used for filtering and routing.

use core::fmt;
use core::str::FromStr;
use std::net::{Ipv4Addr, SocketAddrV4};

pub const BACNET_IP_PORT: u16 = 47808;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// Remote addresses need a network number in 1..=65534.
    InvalidNetwork(u16),
    EmptyMac,
    Malformed,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNetwork(net) => write!(f, "invalid network number {net}"),
            Self::EmptyMac => f.write_str("station address has no octets"),
            Self::Malformed => f.write_str("malformed address"),
        }
    }
}

impl std::error::Error for AddressError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    #[default]
    Null,
    LocalStation(Vec<u8>),
    LocalBroadcast,
    RemoteStation {
        net: u16,
        addr: Vec<u8>,
    },
    RemoteBroadcast {
        net: u16,
    },
    GlobalBroadcast,
}

fn check_net(net: u16) -> Result<(), AddressError> {
    if net == 0 || net == 0xFFFF {
        return Err(AddressError::InvalidNetwork(net));
    }
    Ok(())
}

impl Address {
    pub fn local_station(mac: impl Into<Vec<u8>>) -> Self {
        Self::LocalStation(mac.into())
    }

    pub fn remote_station(net: u16, addr: impl Into<Vec<u8>>) -> Result<Self, AddressError> {
        let addr = addr.into();
        let address = Self::RemoteStation { net, addr };
        address.validate()?;
        Ok(address)
    }

    pub fn remote_broadcast(net: u16) -> Result<Self, AddressError> {
        check_net(net)?;
        Ok(Self::RemoteBroadcast { net })
    }

    /// Station address for a BACnet/IP endpoint: four address octets and the port.
    pub fn from_socket_addr(addr: SocketAddrV4) -> Self {
        let mut mac = addr.ip().octets().to_vec();
        mac.extend_from_slice(&addr.port().to_be_bytes());
        Self::LocalStation(mac)
    }

    /// The endpoint of a six-octet local or remote station.
    pub fn socket_addr(&self) -> Option<SocketAddrV4> {
        let mac = match self {
            Self::LocalStation(mac) | Self::RemoteStation { addr: mac, .. } => mac,
            _ => return None,
        };
        mac_to_socket_addr(mac)
    }

    pub fn validate(&self) -> Result<(), AddressError> {
        match self {
            Self::LocalStation(mac) if mac.is_empty() => Err(AddressError::EmptyMac),
            Self::RemoteStation { net, addr } => {
                check_net(*net)?;
                if addr.is_empty() {
                    return Err(AddressError::EmptyMac);
                }
                Ok(())
            }
            Self::RemoteBroadcast { net } => check_net(*net),
            _ => Ok(()),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::LocalBroadcast | Self::RemoteBroadcast { .. } | Self::GlobalBroadcast
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalStation(_) | Self::LocalBroadcast)
    }

    pub fn network(&self) -> Option<u16> {
        match self {
            Self::RemoteStation { net, .. } | Self::RemoteBroadcast { net } => Some(*net),
            _ => None,
        }
    }

    pub fn mac(&self) -> Option<&[u8]> {
        match self {
            Self::LocalStation(mac) | Self::RemoteStation { addr: mac, .. } => Some(mac),
            _ => None,
        }
    }

    /// Whether `self` is covered by `pattern`.
    ///
    /// `pattern` is the template: a broadcast pattern covers every station in
    /// its scope, a station pattern only the identical station. The relation
    /// is not symmetric. A malformed pattern is an error.
    pub fn matches(&self, pattern: &Address) -> Result<bool, AddressError> {
        pattern.validate()?;
        let covered = match pattern {
            Self::Null => matches!(self, Self::Null),
            Self::LocalBroadcast => matches!(self, Self::LocalStation(_) | Self::LocalBroadcast),
            Self::LocalStation(mac) => {
                matches!(self, Self::LocalStation(theirs) if theirs == mac)
            }
            Self::RemoteBroadcast { net } => match self {
                Self::RemoteStation { net: theirs, .. } | Self::RemoteBroadcast { net: theirs } => {
                    theirs == net
                }
                _ => false,
            },
            Self::RemoteStation { net, addr } => matches!(
                self,
                Self::RemoteStation { net: their_net, addr: their_addr }
                    if their_net == net && their_addr == addr
            ),
            Self::GlobalBroadcast => matches!(self, Self::GlobalBroadcast),
        };
        Ok(covered)
    }
}

fn mac_to_socket_addr(mac: &[u8]) -> Option<SocketAddrV4> {
    match mac {
        [a, b, c, d, hi, lo] => Some(SocketAddrV4::new(
            Ipv4Addr::new(*a, *b, *c, *d),
            u16::from_be_bytes([*hi, *lo]),
        )),
        _ => None,
    }
}

fn fmt_mac(f: &mut fmt::Formatter<'_>, mac: &[u8]) -> fmt::Result {
    if let Some(addr) = mac_to_socket_addr(mac) {
        if addr.port() == BACNET_IP_PORT {
            return write!(f, "{}", addr.ip());
        }
        return write!(f, "{addr}");
    }
    if let [single] = mac {
        return write!(f, "{single}");
    }
    f.write_str("0x")?;
    for b in mac {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::LocalStation(mac) => fmt_mac(f, mac),
            Self::LocalBroadcast => f.write_str("*"),
            Self::RemoteStation { net, addr } => {
                write!(f, "{net}:")?;
                fmt_mac(f, addr)
            }
            Self::RemoteBroadcast { net } => write!(f, "{net}:*"),
            Self::GlobalBroadcast => f.write_str("*:*"),
        }
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>, AddressError> {
    if s.is_empty() || s.len() % 2 != 0 {
        return Err(AddressError::Malformed);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(AddressError::Malformed)
        })
        .collect()
}

/// Parses `a.b.c.d[/prefix][:port]`, returning the endpoint and prefix.
fn parse_ipv4(s: &str) -> Result<(SocketAddrV4, Option<u8>), AddressError> {
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>().map_err(|_| AddressError::Malformed)?,
        ),
        None => (s, BACNET_IP_PORT),
    };
    let (ip, prefix) = match host.split_once('/') {
        Some((ip, prefix)) => {
            let prefix = prefix.parse::<u8>().map_err(|_| AddressError::Malformed)?;
            if prefix > 32 {
                return Err(AddressError::Malformed);
            }
            (ip, Some(prefix))
        }
        None => (host, None),
    };
    let ip: Ipv4Addr = ip.parse().map_err(|_| AddressError::Malformed)?;
    Ok((SocketAddrV4::new(ip, port), prefix))
}

fn parse_mac(s: &str) -> Result<Vec<u8>, AddressError> {
    if let Some(hex) = s.strip_prefix("0x") {
        return parse_hex(hex);
    }
    if let Ok(single) = s.parse::<u8>() {
        return Ok(vec![single]);
    }
    let (addr, _) = parse_ipv4(s)?;
    Ok(Address::from_socket_addr(addr)
        .mac()
        .map(<[u8]>::to_vec)
        .unwrap_or_default())
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => return Err(AddressError::Malformed),
            "null" => return Ok(Self::Null),
            "*" => return Ok(Self::LocalBroadcast),
            "*:*" => return Ok(Self::GlobalBroadcast),
            _ => {}
        }
        // "net:..." needs a leading decimal network and must not be an ip:port
        if let Some((net, rest)) = s.split_once(':') {
            if !net.contains('.') {
                let net: u16 = net.parse().map_err(|_| AddressError::Malformed)?;
                if rest == "*" {
                    return Self::remote_broadcast(net);
                }
                return Self::remote_station(net, parse_mac(rest)?);
            }
        }
        Ok(Self::LocalStation(parse_mac(s)?))
    }
}

/// The local BACnet/IP endpoint with its subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Station {
    pub addr: SocketAddrV4,
    /// Subnet prefix length; `None` means only the limited broadcast is known.
    pub prefix: Option<u8>,
}

impl Ipv4Station {
    pub const fn new(addr: SocketAddrV4, prefix: Option<u8>) -> Self {
        Self { addr, prefix }
    }

    pub fn mask(&self) -> Ipv4Addr {
        match self.prefix {
            Some(0) => Ipv4Addr::UNSPECIFIED,
            Some(p) => Ipv4Addr::from(u32::MAX << (32 - u32::from(p))),
            None => Ipv4Addr::BROADCAST,
        }
    }

    /// Where local broadcasts go: the directed broadcast of the subnet.
    pub fn broadcast(&self) -> SocketAddrV4 {
        let ip = match self.prefix {
            Some(_) => Ipv4Addr::from(u32::from(*self.addr.ip()) | !u32::from(self.mask())),
            None => Ipv4Addr::BROADCAST,
        };
        SocketAddrV4::new(ip, self.addr.port())
    }

    pub fn address(&self) -> Address {
        Address::from_socket_addr(self.addr)
    }
}

impl FromStr for Ipv4Station {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = parse_ipv4(s.trim())?;
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for Ipv4Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr.ip())?;
        if let Some(prefix) = self.prefix {
            write!(f, "/{prefix}")?;
        }
        write!(f, ":{}", self.addr.port())
    }
}
