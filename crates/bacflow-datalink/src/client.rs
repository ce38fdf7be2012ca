use crate::bvll::{BvlcFunction, BvlcResultCode, Bvll};
use crate::tables::{BdtEntry, FdtEntry};
use crate::udp::UdpPort;
use crate::{DataLink, DataLinkError};
use bacflow_core::{Address, Pdu};
use std::net::SocketAddrV4;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Duration, Instant};

/// Management commands against a remote BBMD.
///
/// Commands are serialized: a second command is not sent until the first
/// has its reply, so replies can be paired by function code alone.
#[derive(Debug, Clone)]
pub struct BbmdClient {
    port: UdpPort,
    bbmd: SocketAddrV4,
    command_lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl BbmdClient {
    pub fn new(port: UdpPort, bbmd: SocketAddrV4) -> Self {
        Self {
            port,
            bbmd,
            command_lock: Arc::new(Mutex::new(())),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bbmd(&self) -> SocketAddrV4 {
        self.bbmd
    }

    async fn command(&self, frame: &Bvll, expected: BvlcFunction) -> Result<Bvll, DataLinkError> {
        let _guard = self.command_lock.lock().await;
        let pdu = Pdu::new(frame.to_vec()?).with_destination(Address::from_socket_addr(self.bbmd));
        self.port.send(&pdu).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let pdu = timeout_at(deadline, self.port.recv())
                .await
                .map_err(|_| DataLinkError::Timeout)??;
            if pdu.source.socket_addr() != Some(self.bbmd) {
                continue;
            }
            let reply = match Bvll::decode(&pdu.data) {
                Ok(reply) => reply,
                Err(err) => {
                    log::debug!("ignoring malformed reply from {}: {err}", self.bbmd);
                    continue;
                }
            };
            if reply.function() == expected {
                return Ok(reply);
            }
            match reply {
                Bvll::Result(BvlcResultCode::Successful) => {
                    return Err(DataLinkError::UnexpectedReply(BvlcFunction::Result))
                }
                Bvll::Result(code) => return Err(DataLinkError::BvlcResult(code)),
                other => log::trace!("skipping {:?} while awaiting {expected:?}", other.function()),
            }
        }
    }

    async fn expect_success(&self, frame: &Bvll) -> Result<(), DataLinkError> {
        match self.command(frame, BvlcFunction::Result).await? {
            Bvll::Result(BvlcResultCode::Successful) => Ok(()),
            Bvll::Result(code) => Err(DataLinkError::BvlcResult(code)),
            other => Err(DataLinkError::UnexpectedReply(other.function())),
        }
    }

    pub async fn register_foreign_device(&self, ttl_seconds: u16) -> Result<(), DataLinkError> {
        self.expect_success(&Bvll::RegisterForeignDevice { ttl: ttl_seconds })
            .await
    }

    pub async fn read_broadcast_distribution_table(&self) -> Result<Vec<BdtEntry>, DataLinkError> {
        match self
            .command(
                &Bvll::ReadBroadcastDistributionTable,
                BvlcFunction::ReadBroadcastDistributionTableAck,
            )
            .await?
        {
            Bvll::ReadBroadcastDistributionTableAck(entries) => Ok(entries),
            other => Err(DataLinkError::UnexpectedReply(other.function())),
        }
    }

    pub async fn write_broadcast_distribution_table(
        &self,
        entries: &[BdtEntry],
    ) -> Result<(), DataLinkError> {
        self.expect_success(&Bvll::WriteBroadcastDistributionTable(entries.to_vec()))
            .await
    }

    pub async fn read_foreign_device_table(&self) -> Result<Vec<FdtEntry>, DataLinkError> {
        match self
            .command(
                &Bvll::ReadForeignDeviceTable,
                BvlcFunction::ReadForeignDeviceTableAck,
            )
            .await?
        {
            Bvll::ReadForeignDeviceTableAck(entries) => Ok(entries),
            other => Err(DataLinkError::UnexpectedReply(other.function())),
        }
    }

    pub async fn delete_foreign_device_table_entry(
        &self,
        address: SocketAddrV4,
    ) -> Result<(), DataLinkError> {
        self.expect_success(&Bvll::DeleteForeignDeviceTableEntry(address))
            .await
    }
}
