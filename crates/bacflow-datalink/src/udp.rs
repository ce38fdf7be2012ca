use crate::{DataLink, DataLinkError};
use bacflow_core::{Address, Pdu};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Largest datagram sent or accepted: a 1476-octet APDU plus NPDU and BVLL headers.
pub const MAX_BIP_FRAME_LEN: usize = 1600;

/// A broadcast-enabled UDP socket carrying BVLL frames.
#[derive(Debug, Clone)]
pub struct UdpPort {
    socket: Arc<UdpSocket>,
}

impl UdpPort {
    pub async fn bind(addr: SocketAddrV4) -> Result<Self, DataLinkError> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        log::debug!("B/IP port bound to {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddrV4, DataLinkError> {
        match self.socket.local_addr()? {
            SocketAddr::V4(addr) => Ok(addr),
            other => Err(DataLinkError::NotIpv4(other.to_string())),
        }
    }
}

impl DataLink for UdpPort {
    async fn send(&self, pdu: &Pdu) -> Result<(), DataLinkError> {
        let to = pdu
            .destination
            .socket_addr()
            .ok_or_else(|| DataLinkError::NotIpv4(pdu.destination.to_string()))?;
        if pdu.data.len() > MAX_BIP_FRAME_LEN {
            return Err(DataLinkError::FrameTooLarge);
        }
        log::trace!("udp send {} octets to {to}", pdu.data.len());
        self.socket.send_to(&pdu.data, to).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Pdu, DataLinkError> {
        let mut buf = [0u8; MAX_BIP_FRAME_LEN];
        let (n, src) = self.socket.recv_from(&mut buf).await?;
        let SocketAddr::V4(src) = src else {
            return Err(DataLinkError::NotIpv4(src.to_string()));
        };
        log::trace!("udp recv {n} octets from {src}");
        Ok(Pdu::new(buf[..n].to_vec()).with_source(Address::from_socket_addr(src)))
    }
}
