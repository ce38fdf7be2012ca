use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

pub const WHO_IS_ROUTER_TO_NETWORK: u8 = 0x00;
pub const I_AM_ROUTER_TO_NETWORK: u8 = 0x01;
pub const I_COULD_BE_ROUTER_TO_NETWORK: u8 = 0x02;
pub const REJECT_MESSAGE_TO_NETWORK: u8 = 0x03;
pub const ROUTER_BUSY_TO_NETWORK: u8 = 0x04;
pub const ROUTER_AVAILABLE_TO_NETWORK: u8 = 0x05;
pub const INITIALIZE_ROUTING_TABLE: u8 = 0x06;
pub const INITIALIZE_ROUTING_TABLE_ACK: u8 = 0x07;
pub const ESTABLISH_CONNECTION_TO_NETWORK: u8 = 0x08;
pub const DISCONNECT_CONNECTION_TO_NETWORK: u8 = 0x09;
pub const WHAT_IS_NETWORK_NUMBER: u8 = 0x12;
pub const NETWORK_NUMBER_IS: u8 = 0x13;

bacnet_enum! {
    /// Reason code in Reject-Message-To-Network.
    pub enum RejectMessageReason: u8, Reserved {
        Other = 0 => "other",
        NotDirectlyConnected = 1 => "not-directly-connected",
        RouterBusy = 2 => "router-busy",
        UnknownMessageType = 3 => "unknown-message-type",
        MessageTooLong = 4 => "message-too-long",
        SecurityError = 5 => "security-error",
        AddressingError = 6 => "addressing-error",
    }
}

/// One row of Initialize-Routing-Table(-Ack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTableEntry {
    pub network: u16,
    pub port_id: u8,
    pub port_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    WhoIsRouterToNetwork(Option<u16>),
    IAmRouterToNetwork(Vec<u16>),
    ICouldBeRouterToNetwork {
        network: u16,
        performance_index: u8,
    },
    RejectMessageToNetwork {
        reason: RejectMessageReason,
        network: u16,
    },
    RouterBusyToNetwork(Vec<u16>),
    RouterAvailableToNetwork(Vec<u16>),
    InitializeRoutingTable(Vec<RoutingTableEntry>),
    InitializeRoutingTableAck(Vec<RoutingTableEntry>),
    EstablishConnectionToNetwork {
        network: u16,
        termination_time: u8,
    },
    DisconnectConnectionToNetwork(u16),
    WhatIsNetworkNumber,
    NetworkNumberIs {
        network: u16,
        configured: bool,
    },
    Proprietary {
        message_type: u8,
        vendor_id: u16,
        data: Vec<u8>,
    },
}

fn write_networks(w: &mut Writer, networks: &[u16]) -> Result<(), EncodeError> {
    for net in networks {
        w.write_be_u16(*net)?;
    }
    Ok(())
}

fn read_networks(r: &mut Reader<'_>) -> Result<Vec<u16>, DecodeError> {
    if r.remaining() % 2 != 0 {
        return Err(DecodeError::InvalidLength);
    }
    let mut networks = Vec::with_capacity(r.remaining() / 2);
    while !r.is_empty() {
        networks.push(r.read_be_u16()?);
    }
    Ok(networks)
}

fn write_table(w: &mut Writer, entries: &[RoutingTableEntry]) -> Result<(), EncodeError> {
    let count = u8::try_from(entries.len()).map_err(|_| EncodeError::ValueOutOfRange)?;
    w.write_u8(count)?;
    for entry in entries {
        let info_len = u8::try_from(entry.port_info.len()).map_err(|_| EncodeError::InvalidLength)?;
        w.write_be_u16(entry.network)?;
        w.write_u8(entry.port_id)?;
        w.write_u8(info_len)?;
        w.write_all(&entry.port_info)?;
    }
    Ok(())
}

fn read_table(r: &mut Reader<'_>) -> Result<Vec<RoutingTableEntry>, DecodeError> {
    let count = r.read_u8()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let network = r.read_be_u16()?;
        let port_id = r.read_u8()?;
        let info_len = r.read_u8()?;
        let port_info = r.read_exact(info_len as usize)?.to_vec();
        entries.push(RoutingTableEntry {
            network,
            port_id,
            port_info,
        });
    }
    Ok(entries)
}

impl NetworkMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            Self::WhoIsRouterToNetwork(_) => WHO_IS_ROUTER_TO_NETWORK,
            Self::IAmRouterToNetwork(_) => I_AM_ROUTER_TO_NETWORK,
            Self::ICouldBeRouterToNetwork { .. } => I_COULD_BE_ROUTER_TO_NETWORK,
            Self::RejectMessageToNetwork { .. } => REJECT_MESSAGE_TO_NETWORK,
            Self::RouterBusyToNetwork(_) => ROUTER_BUSY_TO_NETWORK,
            Self::RouterAvailableToNetwork(_) => ROUTER_AVAILABLE_TO_NETWORK,
            Self::InitializeRoutingTable(_) => INITIALIZE_ROUTING_TABLE,
            Self::InitializeRoutingTableAck(_) => INITIALIZE_ROUTING_TABLE_ACK,
            Self::EstablishConnectionToNetwork { .. } => ESTABLISH_CONNECTION_TO_NETWORK,
            Self::DisconnectConnectionToNetwork(_) => DISCONNECT_CONNECTION_TO_NETWORK,
            Self::WhatIsNetworkNumber => WHAT_IS_NETWORK_NUMBER,
            Self::NetworkNumberIs { .. } => NETWORK_NUMBER_IS,
            Self::Proprietary { message_type, .. } => *message_type,
        }
    }

    /// Message type, vendor id (proprietary types only) and body octets.
    pub fn encode(&self) -> Result<(u8, Option<u16>, Vec<u8>), EncodeError> {
        let mut w = Writer::new();
        let mut vendor = None;
        match self {
            Self::WhoIsRouterToNetwork(net) => {
                if let Some(net) = net {
                    w.write_be_u16(*net)?;
                }
            }
            Self::IAmRouterToNetwork(nets)
            | Self::RouterBusyToNetwork(nets)
            | Self::RouterAvailableToNetwork(nets) => write_networks(&mut w, nets)?,
            Self::ICouldBeRouterToNetwork {
                network,
                performance_index,
            } => {
                w.write_be_u16(*network)?;
                w.write_u8(*performance_index)?;
            }
            Self::RejectMessageToNetwork { reason, network } => {
                w.write_u8(reason.to_raw())?;
                w.write_be_u16(*network)?;
            }
            Self::InitializeRoutingTable(entries) | Self::InitializeRoutingTableAck(entries) => {
                write_table(&mut w, entries)?
            }
            Self::EstablishConnectionToNetwork {
                network,
                termination_time,
            } => {
                w.write_be_u16(*network)?;
                w.write_u8(*termination_time)?;
            }
            Self::DisconnectConnectionToNetwork(net) => w.write_be_u16(*net)?,
            Self::WhatIsNetworkNumber => {}
            Self::NetworkNumberIs {
                network,
                configured,
            } => {
                w.write_be_u16(*network)?;
                w.write_u8(u8::from(*configured))?;
            }
            Self::Proprietary {
                message_type,
                vendor_id,
                data,
            } => {
                if *message_type < 0x80 {
                    return Err(EncodeError::ValueOutOfRange);
                }
                vendor = Some(*vendor_id);
                w.write_all(data)?;
            }
        }
        Ok((self.message_type(), vendor, w.into_inner()))
    }

    pub fn decode(message_type: u8, vendor_id: Option<u16>, body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(body);
        let message = match message_type {
            WHO_IS_ROUTER_TO_NETWORK => {
                if r.is_empty() {
                    Self::WhoIsRouterToNetwork(None)
                } else {
                    Self::WhoIsRouterToNetwork(Some(r.read_be_u16()?))
                }
            }
            I_AM_ROUTER_TO_NETWORK => Self::IAmRouterToNetwork(read_networks(&mut r)?),
            I_COULD_BE_ROUTER_TO_NETWORK => Self::ICouldBeRouterToNetwork {
                network: r.read_be_u16()?,
                performance_index: r.read_u8()?,
            },
            REJECT_MESSAGE_TO_NETWORK => Self::RejectMessageToNetwork {
                reason: RejectMessageReason::from_raw(r.read_u8()?),
                network: r.read_be_u16()?,
            },
            ROUTER_BUSY_TO_NETWORK => Self::RouterBusyToNetwork(read_networks(&mut r)?),
            ROUTER_AVAILABLE_TO_NETWORK => Self::RouterAvailableToNetwork(read_networks(&mut r)?),
            INITIALIZE_ROUTING_TABLE => Self::InitializeRoutingTable(read_table(&mut r)?),
            INITIALIZE_ROUTING_TABLE_ACK => Self::InitializeRoutingTableAck(read_table(&mut r)?),
            ESTABLISH_CONNECTION_TO_NETWORK => Self::EstablishConnectionToNetwork {
                network: r.read_be_u16()?,
                termination_time: r.read_u8()?,
            },
            DISCONNECT_CONNECTION_TO_NETWORK => {
                Self::DisconnectConnectionToNetwork(r.read_be_u16()?)
            }
            WHAT_IS_NETWORK_NUMBER => Self::WhatIsNetworkNumber,
            NETWORK_NUMBER_IS => Self::NetworkNumberIs {
                network: r.read_be_u16()?,
                configured: r.read_u8()? != 0,
            },
            0x80..=0xFF => Self::Proprietary {
                message_type,
                vendor_id: vendor_id.ok_or(DecodeError::InvalidValue)?,
                data: r.read_rest().to_vec(),
            },
            _ => return Err(DecodeError::Unsupported),
        };
        if !r.is_empty() {
            return Err(DecodeError::TrailingData);
        }
        Ok(message)
    }
}
