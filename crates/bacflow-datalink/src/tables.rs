//! Broadcast Distribution and Foreign Device tables.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// One peer BBMD and the mask used to reach its subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BdtEntry {
    pub address: SocketAddrV4,
    pub mask: Ipv4Addr,
}

impl BdtEntry {
    /// A peer reached by unicast; it rebroadcasts on its own subnet.
    pub fn two_hop(address: SocketAddrV4) -> Self {
        Self {
            address,
            mask: Ipv4Addr::BROADCAST,
        }
    }

    pub fn is_two_hop(&self) -> bool {
        self.mask == Ipv4Addr::BROADCAST
    }

    /// Where Forwarded-NPDUs for this peer are sent: the peer itself for an
    /// all-ones mask, otherwise the directed broadcast of its subnet.
    pub fn forward_address(&self) -> SocketAddrV4 {
        let ip = u32::from(*self.address.ip()) | !u32::from(self.mask);
        SocketAddrV4::new(Ipv4Addr::from(ip), self.address.port())
    }
}

impl fmt::Display for BdtEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.mask)
    }
}

/// Parses `ip:port` or `ip:port/mask`; no mask means two-hop.
impl FromStr for BdtEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, mask) = match s.split_once('/') {
            Some((addr, mask)) => (addr, Some(mask)),
            None => (s, None),
        };
        let address = addr
            .parse::<SocketAddrV4>()
            .or_else(|_| {
                addr.parse::<Ipv4Addr>()
                    .map(|ip| SocketAddrV4::new(ip, bacflow_core::address::BACNET_IP_PORT))
            })
            .map_err(|_| format!("invalid BDT address '{addr}'"))?;
        let mask = match mask {
            Some(mask) => mask
                .parse::<Ipv4Addr>()
                .map_err(|_| format!("invalid BDT mask '{mask}'"))?,
            None => Ipv4Addr::BROADCAST,
        };
        Ok(Self { address, mask })
    }
}

/// Foreign device registration as carried in Read-FDT-Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FdtEntry {
    pub address: SocketAddrV4,
    pub ttl_seconds: u16,
    pub remaining_seconds: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    ttl: u16,
    expires: Instant,
}

/// Registered foreign devices keyed by their B/IP address.
///
/// An entry is live until exactly `ttl` seconds after its last
/// registration; re-registering refreshes the deadline in place.
#[derive(Debug, Clone, Default)]
pub struct ForeignDeviceTable {
    entries: BTreeMap<SocketAddrV4, Registration>,
}

impl ForeignDeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds or refreshes `address`. Returns `true` for a new registration.
    pub fn register(&mut self, address: SocketAddrV4, ttl: u16, now: Instant) -> bool {
        let registration = Registration {
            ttl,
            expires: now + Duration::from_secs(u64::from(ttl)),
        };
        self.entries.insert(address, registration).is_none()
    }

    pub fn delete(&mut self, address: SocketAddrV4) -> bool {
        self.entries.remove(&address).is_some()
    }

    pub fn is_live(&self, address: SocketAddrV4, now: Instant) -> bool {
        self.entries
            .get(&address)
            .is_some_and(|reg| now < reg.expires)
    }

    /// Addresses whose registration has not yet expired.
    pub fn live(&self, now: Instant) -> impl Iterator<Item = SocketAddrV4> + '_ {
        self.entries
            .iter()
            .filter(move |(_, reg)| now < reg.expires)
            .map(|(addr, _)| *addr)
    }

    /// Removes expired registrations and returns their addresses.
    pub fn sweep(&mut self, now: Instant) -> Vec<SocketAddrV4> {
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, reg)| now >= reg.expires)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &expired {
            self.entries.remove(addr);
        }
        expired
    }

    pub fn entries(&self, now: Instant) -> Vec<FdtEntry> {
        self.entries
            .iter()
            .map(|(address, reg)| {
                let remaining = reg.expires.saturating_duration_since(now).as_secs();
                FdtEntry {
                    address: *address,
                    ttl_seconds: reg.ttl,
                    remaining_seconds: u16::try_from(remaining).unwrap_or(u16::MAX),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{BdtEntry, ForeignDeviceTable};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::{Duration, Instant};

    fn fd(last: u8) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last), 47808)
    }

    #[test]
    fn forward_address_honours_mask() {
        let directed: BdtEntry = "192.168.1.10:47808/255.255.255.0".parse().unwrap();
        assert_eq!(
            directed.forward_address(),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 255), 47808)
        );
        let two_hop: BdtEntry = "192.168.2.10".parse().unwrap();
        assert!(two_hop.is_two_hop());
        assert_eq!(two_hop.forward_address(), two_hop.address);
        assert!("nope/1".parse::<BdtEntry>().is_err());
    }

    #[test]
    fn registration_expires_exactly_at_ttl() {
        let t0 = Instant::now();
        let mut fdt = ForeignDeviceTable::new();
        assert!(fdt.register(fd(1), 30, t0));
        assert!(fdt.is_live(fd(1), t0 + Duration::from_secs(29)));
        assert!(!fdt.is_live(fd(1), t0 + Duration::from_secs(30)));
        assert_eq!(fdt.live(t0 + Duration::from_secs(30)).count(), 0);
        assert_eq!(fdt.sweep(t0 + Duration::from_secs(30)), vec![fd(1)]);
        assert!(fdt.is_empty());
    }

    #[test]
    fn reregistration_refreshes_without_duplicating() {
        let t0 = Instant::now();
        let mut fdt = ForeignDeviceTable::new();
        fdt.register(fd(2), 30, t0);
        assert!(!fdt.register(fd(2), 60, t0 + Duration::from_secs(20)));
        assert_eq!(fdt.len(), 1);
        assert!(fdt.is_live(fd(2), t0 + Duration::from_secs(79)));

        let entries = fdt.entries(t0 + Duration::from_secs(30));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ttl_seconds, 60);
        assert_eq!(entries[0].remaining_seconds, 50);
    }
}
