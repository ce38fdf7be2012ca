//! BACnet Virtual Link Control frames (Annex J).

use crate::tables::{BdtEntry, FdtEntry};
use bacflow_core::encoding::{reader::Reader, writer::Writer};
use bacflow_core::{DecodeError, EncodeError};
use std::net::{Ipv4Addr, SocketAddrV4};

pub const BVLC_TYPE_BIP: u8 = 0x81;
pub const BVLC_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    Result,
    WriteBroadcastDistributionTable,
    ReadBroadcastDistributionTable,
    ReadBroadcastDistributionTableAck,
    ForwardedNpdu,
    RegisterForeignDevice,
    ReadForeignDeviceTable,
    ReadForeignDeviceTableAck,
    DeleteForeignDeviceTableEntry,
    DistributeBroadcastToNetwork,
    OriginalUnicastNpdu,
    OriginalBroadcastNpdu,
    Unknown(u8),
}

impl BvlcFunction {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Result,
            0x01 => Self::WriteBroadcastDistributionTable,
            0x02 => Self::ReadBroadcastDistributionTable,
            0x03 => Self::ReadBroadcastDistributionTableAck,
            0x04 => Self::ForwardedNpdu,
            0x05 => Self::RegisterForeignDevice,
            0x06 => Self::ReadForeignDeviceTable,
            0x07 => Self::ReadForeignDeviceTableAck,
            0x08 => Self::DeleteForeignDeviceTableEntry,
            0x09 => Self::DistributeBroadcastToNetwork,
            0x0A => Self::OriginalUnicastNpdu,
            0x0B => Self::OriginalBroadcastNpdu,
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Result => 0x00,
            Self::WriteBroadcastDistributionTable => 0x01,
            Self::ReadBroadcastDistributionTable => 0x02,
            Self::ReadBroadcastDistributionTableAck => 0x03,
            Self::ForwardedNpdu => 0x04,
            Self::RegisterForeignDevice => 0x05,
            Self::ReadForeignDeviceTable => 0x06,
            Self::ReadForeignDeviceTableAck => 0x07,
            Self::DeleteForeignDeviceTableEntry => 0x08,
            Self::DistributeBroadcastToNetwork => 0x09,
            Self::OriginalUnicastNpdu => 0x0A,
            Self::OriginalBroadcastNpdu => 0x0B,
            Self::Unknown(v) => v,
        }
    }
}

/// BVLC-Result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BvlcResultCode {
    Successful,
    WriteBroadcastDistributionTableNak,
    ReadBroadcastDistributionTableNak,
    RegisterForeignDeviceNak,
    ReadForeignDeviceTableNak,
    DeleteForeignDeviceTableEntryNak,
    DistributeBroadcastToNetworkNak,
    Unknown(u16),
}

impl BvlcResultCode {
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => Self::Successful,
            0x0010 => Self::WriteBroadcastDistributionTableNak,
            0x0020 => Self::ReadBroadcastDistributionTableNak,
            0x0030 => Self::RegisterForeignDeviceNak,
            0x0040 => Self::ReadForeignDeviceTableNak,
            0x0050 => Self::DeleteForeignDeviceTableEntryNak,
            0x0060 => Self::DistributeBroadcastToNetworkNak,
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Successful => 0x0000,
            Self::WriteBroadcastDistributionTableNak => 0x0010,
            Self::ReadBroadcastDistributionTableNak => 0x0020,
            Self::RegisterForeignDeviceNak => 0x0030,
            Self::ReadForeignDeviceTableNak => 0x0040,
            Self::DeleteForeignDeviceTableEntryNak => 0x0050,
            Self::DistributeBroadcastToNetworkNak => 0x0060,
            Self::Unknown(v) => v,
        }
    }

    /// The NAK a node without BBMD support sends for a BBMD-only request.
    pub const fn nak_for(function: BvlcFunction) -> Option<Self> {
        match function {
            BvlcFunction::WriteBroadcastDistributionTable => {
                Some(Self::WriteBroadcastDistributionTableNak)
            }
            BvlcFunction::ReadBroadcastDistributionTable => {
                Some(Self::ReadBroadcastDistributionTableNak)
            }
            BvlcFunction::RegisterForeignDevice => Some(Self::RegisterForeignDeviceNak),
            BvlcFunction::ReadForeignDeviceTable => Some(Self::ReadForeignDeviceTableNak),
            BvlcFunction::DeleteForeignDeviceTableEntry => {
                Some(Self::DeleteForeignDeviceTableEntryNak)
            }
            BvlcFunction::DistributeBroadcastToNetwork => {
                Some(Self::DistributeBroadcastToNetworkNak)
            }
            _ => None,
        }
    }
}

/// One decoded BVLL frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bvll {
    Result(BvlcResultCode),
    WriteBroadcastDistributionTable(Vec<BdtEntry>),
    ReadBroadcastDistributionTable,
    ReadBroadcastDistributionTableAck(Vec<BdtEntry>),
    ForwardedNpdu { origin: SocketAddrV4, npdu: Vec<u8> },
    RegisterForeignDevice { ttl: u16 },
    ReadForeignDeviceTable,
    ReadForeignDeviceTableAck(Vec<FdtEntry>),
    DeleteForeignDeviceTableEntry(SocketAddrV4),
    DistributeBroadcastToNetwork(Vec<u8>),
    OriginalUnicastNpdu(Vec<u8>),
    OriginalBroadcastNpdu(Vec<u8>),
}

impl Bvll {
    pub fn function(&self) -> BvlcFunction {
        match self {
            Self::Result(_) => BvlcFunction::Result,
            Self::WriteBroadcastDistributionTable(_) => {
                BvlcFunction::WriteBroadcastDistributionTable
            }
            Self::ReadBroadcastDistributionTable => BvlcFunction::ReadBroadcastDistributionTable,
            Self::ReadBroadcastDistributionTableAck(_) => {
                BvlcFunction::ReadBroadcastDistributionTableAck
            }
            Self::ForwardedNpdu { .. } => BvlcFunction::ForwardedNpdu,
            Self::RegisterForeignDevice { .. } => BvlcFunction::RegisterForeignDevice,
            Self::ReadForeignDeviceTable => BvlcFunction::ReadForeignDeviceTable,
            Self::ReadForeignDeviceTableAck(_) => BvlcFunction::ReadForeignDeviceTableAck,
            Self::DeleteForeignDeviceTableEntry(_) => BvlcFunction::DeleteForeignDeviceTableEntry,
            Self::DistributeBroadcastToNetwork(_) => BvlcFunction::DistributeBroadcastToNetwork,
            Self::OriginalUnicastNpdu(_) => BvlcFunction::OriginalUnicastNpdu,
            Self::OriginalBroadcastNpdu(_) => BvlcFunction::OriginalBroadcastNpdu,
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut body = Writer::new();
        match self {
            Self::Result(code) => body.write_be_u16(code.to_u16())?,
            Self::WriteBroadcastDistributionTable(entries)
            | Self::ReadBroadcastDistributionTableAck(entries) => {
                for entry in entries {
                    write_socket_addr(&mut body, entry.address)?;
                    body.write_all(&entry.mask.octets())?;
                }
            }
            Self::ReadBroadcastDistributionTable | Self::ReadForeignDeviceTable => {}
            Self::ForwardedNpdu { origin, npdu } => {
                write_socket_addr(&mut body, *origin)?;
                body.write_all(npdu)?;
            }
            Self::RegisterForeignDevice { ttl } => body.write_be_u16(*ttl)?,
            Self::ReadForeignDeviceTableAck(entries) => {
                for entry in entries {
                    write_socket_addr(&mut body, entry.address)?;
                    body.write_be_u16(entry.ttl_seconds)?;
                    body.write_be_u16(entry.remaining_seconds)?;
                }
            }
            Self::DeleteForeignDeviceTableEntry(addr) => write_socket_addr(&mut body, *addr)?,
            Self::DistributeBroadcastToNetwork(npdu)
            | Self::OriginalUnicastNpdu(npdu)
            | Self::OriginalBroadcastNpdu(npdu) => body.write_all(npdu)?,
        }

        let body = body.into_inner();
        let length = u16::try_from(BVLC_HEADER_LEN + body.len())
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        w.write_u8(BVLC_TYPE_BIP)?;
        w.write_u8(self.function().to_u8())?;
        w.write_be_u16(length)?;
        w.write_all(&body)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }

    /// Decodes one frame; the length field must match `data` exactly.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        if r.read_u8()? != BVLC_TYPE_BIP {
            return Err(DecodeError::InvalidValue);
        }
        let function = BvlcFunction::from_u8(r.read_u8()?);
        let length = usize::from(r.read_be_u16()?);
        if length < BVLC_HEADER_LEN || length != data.len() {
            return Err(DecodeError::InvalidLength);
        }

        let frame = match function {
            BvlcFunction::Result => Self::Result(BvlcResultCode::from_u16(r.read_be_u16()?)),
            BvlcFunction::WriteBroadcastDistributionTable => {
                Self::WriteBroadcastDistributionTable(read_bdt(&mut r)?)
            }
            BvlcFunction::ReadBroadcastDistributionTable => Self::ReadBroadcastDistributionTable,
            BvlcFunction::ReadBroadcastDistributionTableAck => {
                Self::ReadBroadcastDistributionTableAck(read_bdt(&mut r)?)
            }
            BvlcFunction::ForwardedNpdu => Self::ForwardedNpdu {
                origin: read_socket_addr(&mut r)?,
                npdu: r.read_rest().to_vec(),
            },
            BvlcFunction::RegisterForeignDevice => Self::RegisterForeignDevice {
                ttl: r.read_be_u16()?,
            },
            BvlcFunction::ReadForeignDeviceTable => Self::ReadForeignDeviceTable,
            BvlcFunction::ReadForeignDeviceTableAck => {
                let mut entries = Vec::new();
                while !r.is_empty() {
                    entries.push(FdtEntry {
                        address: read_socket_addr(&mut r)?,
                        ttl_seconds: r.read_be_u16()?,
                        remaining_seconds: r.read_be_u16()?,
                    });
                }
                Self::ReadForeignDeviceTableAck(entries)
            }
            BvlcFunction::DeleteForeignDeviceTableEntry => {
                Self::DeleteForeignDeviceTableEntry(read_socket_addr(&mut r)?)
            }
            BvlcFunction::DistributeBroadcastToNetwork => {
                Self::DistributeBroadcastToNetwork(r.read_rest().to_vec())
            }
            BvlcFunction::OriginalUnicastNpdu => Self::OriginalUnicastNpdu(r.read_rest().to_vec()),
            BvlcFunction::OriginalBroadcastNpdu => {
                Self::OriginalBroadcastNpdu(r.read_rest().to_vec())
            }
            BvlcFunction::Unknown(_) => return Err(DecodeError::Unsupported),
        };
        if !r.is_empty() {
            return Err(DecodeError::TrailingData);
        }
        Ok(frame)
    }
}

fn write_socket_addr(w: &mut Writer, addr: SocketAddrV4) -> Result<(), EncodeError> {
    w.write_all(&addr.ip().octets())?;
    w.write_be_u16(addr.port())
}

fn read_socket_addr(r: &mut Reader<'_>) -> Result<SocketAddrV4, DecodeError> {
    let ip = r.read_exact(4)?;
    let ip = Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]);
    Ok(SocketAddrV4::new(ip, r.read_be_u16()?))
}

fn read_bdt(r: &mut Reader<'_>) -> Result<Vec<BdtEntry>, DecodeError> {
    let mut entries = Vec::new();
    while !r.is_empty() {
        let address = read_socket_addr(r)?;
        let mask = r.read_exact(4)?;
        entries.push(BdtEntry {
            address,
            mask: Ipv4Addr::new(mask[0], mask[1], mask[2], mask[3]),
        });
    }
    Ok(entries)
}
