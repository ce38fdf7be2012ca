use crate::DataLinkError;
use bacflow_core::Pdu;

/// Async transport beneath the bottom layer of a stack.
///
/// Outgoing PDUs carry the link address in `destination` and a complete
/// frame in `data`; received PDUs carry the sender in `source`.
pub trait DataLink {
    async fn send(&self, pdu: &Pdu) -> Result<(), DataLinkError>;

    async fn recv(&self) -> Result<Pdu, DataLinkError>;
}
