use crate::bvll::{BvlcFunction, BvlcResultCode};
use bacflow_core::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors raised by the UDP port and the BBMD management client.
#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large")]
    FrameTooLarge,
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] DecodeError),
    #[error("cannot encode frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("{0} is not a B/IP address")]
    NotIpv4(String),
    #[error("BVLC result {0:?}")]
    BvlcResult(BvlcResultCode),
    #[error("unexpected {0:?} reply")]
    UnexpectedReply(BvlcFunction),
    #[error("timed out waiting for the BBMD")]
    Timeout,
}
