use bacflow_core::apdu::{AbortReason, RejectReason};
use bacflow_core::comm::BindError;
use bacflow_core::types::{ErrorClass, ErrorCode, ObjectId};
use bacflow_core::{DecodeError, EncodeError};
use bacflow_datalink::DataLinkError;
use thiserror::Error;

/// Why an IOCB was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("request timed out")]
    Timeout,
    #[error("remote error {class}: {code}")]
    RemoteError { class: ErrorClass, code: ErrorCode },
    #[error("remote reject: {reason}")]
    RemoteReject { reason: RejectReason },
    #[error("remote abort: {reason}")]
    RemoteAbort { reason: AbortReason },
    #[error("aborted: {reason}")]
    Aborted { reason: AbortReason },
    #[error("no invoke id available for the destination")]
    NoInvokeId,
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("destination unreachable")]
    Unreachable,
    #[error("event loop stopped")]
    Stopped,
}

/// Misuse of an IOCB by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IocbError {
    #[error("iocb already complete")]
    AlreadyComplete,
}

/// Errors raised while assembling a stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("network {0} is already bound to an adapter")]
    DuplicateNetwork(u16),
    #[error("no adapter on port {0}")]
    UnknownAdapterPort(usize),
    #[error("invalid network number {0}")]
    InvalidNetwork(u16),
    #[error("invalid device configuration: {0}")]
    InvalidDevice(String),
    #[error("object {0} already exists")]
    DuplicateObject(ObjectId),
    #[error("bind failed: {0}")]
    Bind(#[from] BindError),
}

/// Errors from the event loop.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("event loop stopped")]
    Stopped,
}
