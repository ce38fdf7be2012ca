//! Network layer protocol data units.

pub mod message;

pub use message::{NetworkMessage, RejectMessageReason, RoutingTableEntry};

use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// BACnet network layer protocol version (always `0x01`).
pub const NPDU_VERSION: u8 = 0x01;

pub const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
pub const CONTROL_DNET: u8 = 0x20;
pub const CONTROL_SNET: u8 = 0x08;
pub const CONTROL_EXPECTING_REPLY: u8 = 0x04;

/// Network number used in DNET for a global broadcast.
pub const GLOBAL_NETWORK: u16 = 0xFFFF;

pub const DEFAULT_HOP_COUNT: u8 = 255;

/// DNET/SNET with its MAC. An empty MAC in a destination is a broadcast
/// on that network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetAddress {
    pub network: u16,
    pub mac: Vec<u8>,
}

impl NetAddress {
    pub fn new(network: u16, mac: impl Into<Vec<u8>>) -> Self {
        Self {
            network,
            mac: mac.into(),
        }
    }

    pub fn broadcast(network: u16) -> Self {
        Self {
            network,
            mac: Vec::new(),
        }
    }
}

/// NPDU header plus the APDU or network-message body that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Npdu {
    pub network_message: bool,
    pub expecting_reply: bool,
    pub priority: u8,
    pub destination: Option<NetAddress>,
    pub source: Option<NetAddress>,
    pub hop_count: Option<u8>,
    pub message_type: Option<u8>,
    pub vendor_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl Npdu {
    /// An NPDU carrying application data.
    pub fn apdu(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// An NPDU carrying a network-layer message.
    pub fn network(message: &NetworkMessage) -> Result<Self, EncodeError> {
        let (message_type, vendor_id, payload) = message.encode()?;
        Ok(Self {
            network_message: true,
            message_type: Some(message_type),
            vendor_id,
            payload,
            ..Self::default()
        })
    }

    pub fn with_destination(mut self, destination: NetAddress) -> Self {
        self.destination = Some(destination);
        self.hop_count.get_or_insert(DEFAULT_HOP_COUNT);
        self
    }

    pub fn with_source(mut self, source: NetAddress) -> Self {
        self.source = Some(source);
        self
    }

    pub fn control(&self) -> u8 {
        let mut control = self.priority & 0x03;
        if self.network_message {
            control |= CONTROL_NETWORK_MESSAGE;
        }
        if self.destination.is_some() {
            control |= CONTROL_DNET;
        }
        if self.source.is_some() {
            control |= CONTROL_SNET;
        }
        if self.expecting_reply {
            control |= CONTROL_EXPECTING_REPLY;
        }
        control
    }

    pub fn network_message(&self) -> Result<Option<NetworkMessage>, DecodeError> {
        match (self.network_message, self.message_type) {
            (true, Some(message_type)) => {
                NetworkMessage::decode(message_type, self.vendor_id, &self.payload).map(Some)
            }
            (true, None) => Err(DecodeError::InvalidValue),
            (false, _) => Ok(None),
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(NPDU_VERSION)?;
        w.write_u8(self.control())?;

        if let Some(dest) = &self.destination {
            encode_addr(w, dest)?;
        }
        if let Some(src) = &self.source {
            if src.mac.is_empty() || src.network == GLOBAL_NETWORK {
                return Err(EncodeError::ValueOutOfRange);
            }
            encode_addr(w, src)?;
        }
        if self.destination.is_some() {
            w.write_u8(self.hop_count.unwrap_or(DEFAULT_HOP_COUNT))?;
        }
        if self.network_message {
            let message_type = self
                .message_type
                .ok_or(EncodeError::MissingRequiredElement("message-type"))?;
            w.write_u8(message_type)?;
            if message_type >= 0x80 {
                w.write_be_u16(self.vendor_id.unwrap_or(0))?;
            }
        }
        w.write_all(&self.payload)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let version = r.read_u8()?;
        if version != NPDU_VERSION {
            return Err(DecodeError::InvalidValue);
        }

        let control = r.read_u8()?;
        let has_dest = (control & CONTROL_DNET) != 0;
        let has_src = (control & CONTROL_SNET) != 0;
        let network_message = (control & CONTROL_NETWORK_MESSAGE) != 0;

        let destination = if has_dest {
            Some(decode_addr(&mut r)?)
        } else {
            None
        };
        let source = if has_src {
            let src = decode_addr(&mut r)?;
            // a source is always one specific station
            if src.mac.is_empty() || src.network == GLOBAL_NETWORK {
                return Err(DecodeError::InvalidValue);
            }
            Some(src)
        } else {
            None
        };
        let hop_count = if has_dest { Some(r.read_u8()?) } else { None };

        let (message_type, vendor_id) = if network_message {
            let mt = r.read_u8()?;
            let vid = if mt >= 0x80 {
                Some(r.read_be_u16()?)
            } else {
                None
            };
            (Some(mt), vid)
        } else {
            (None, None)
        };

        Ok(Self {
            network_message,
            expecting_reply: (control & CONTROL_EXPECTING_REPLY) != 0,
            priority: control & 0x03,
            destination,
            source,
            hop_count,
            message_type,
            vendor_id,
            payload: r.read_rest().to_vec(),
        })
    }
}

fn encode_addr(w: &mut Writer, addr: &NetAddress) -> Result<(), EncodeError> {
    let len = u8::try_from(addr.mac.len()).map_err(|_| EncodeError::InvalidLength)?;
    w.write_be_u16(addr.network)?;
    w.write_u8(len)?;
    w.write_all(&addr.mac)
}

fn decode_addr(r: &mut Reader<'_>) -> Result<NetAddress, DecodeError> {
    let network = r.read_be_u16()?;
    if network == 0 {
        return Err(DecodeError::InvalidValue);
    }
    let mac_len = r.read_u8()?;
    let mac = r.read_exact(mac_len as usize)?.to_vec();
    Ok(NetAddress { network, mac })
}
