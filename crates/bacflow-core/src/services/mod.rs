//! Service request and acknowledgement bodies.
//!
//! Every body is a [`Sequence`](crate::constructed::Sequence); the traits
//! here attach the service choice so a value can be framed into its APDU.

pub mod error_type;
pub mod i_am;
pub mod read_property;
pub mod who_has;
pub mod who_is;
pub mod write_property;

pub use error_type::ErrorType;
pub use i_am::IAmRequest;
pub use read_property::{ReadPropertyAck, ReadPropertyRequest};
pub use who_has::{IHaveRequest, WhoHasObject, WhoHasRequest};
pub use who_is::WhoIsRequest;
pub use write_property::WritePropertyRequest;

use core::fmt;

use crate::apdu::{
    ComplexAck, ConfirmedRequest, ConfirmedServiceChoice, UnconfirmedRequest,
    UnconfirmedServiceChoice,
};
use crate::datatype::{from_bytes, to_bytes, Datatype};
use crate::{DecodeError, EncodeError};

pub trait ConfirmedService: Datatype {
    const CHOICE: ConfirmedServiceChoice;
}

pub trait UnconfirmedService: Datatype {
    const CHOICE: UnconfirmedServiceChoice;
}

/// Body of a Complex-ACK answering a confirmed service.
pub trait ServiceAck: Datatype {
    const CHOICE: ConfirmedServiceChoice;
}

pub fn unconfirmed_request<S: UnconfirmedService>(
    service: &S,
) -> Result<UnconfirmedRequest, EncodeError> {
    Ok(UnconfirmedRequest {
        service_choice: S::CHOICE.to_raw(),
        data: to_bytes(service)?,
    })
}

/// Frames `service` as an unsegmented confirmed request; the segmentation
/// layer fills in the header fields it negotiates.
pub fn confirmed_request<S: ConfirmedService>(
    invoke_id: u8,
    service: &S,
) -> Result<ConfirmedRequest, EncodeError> {
    Ok(ConfirmedRequest::new(invoke_id, S::CHOICE.to_raw(), to_bytes(service)?))
}

pub fn complex_ack<S: ServiceAck>(invoke_id: u8, ack: &S) -> Result<ComplexAck, EncodeError> {
    Ok(ComplexAck::new(invoke_id, S::CHOICE.to_raw(), to_bytes(ack)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceDecodeError {
    /// No decoder is registered for the service choice.
    UnrecognizedService(u8),
    Decode(DecodeError),
}

impl fmt::Display for ServiceDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedService(choice) => write!(f, "unrecognized service {choice}"),
            Self::Decode(err) => write!(f, "service decode failed: {err}"),
        }
    }
}

impl std::error::Error for ServiceDecodeError {}

impl From<DecodeError> for ServiceDecodeError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Decoded confirmed service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmedServiceRequest {
    ReadProperty(ReadPropertyRequest),
    WriteProperty(WritePropertyRequest),
}

impl ConfirmedServiceRequest {
    pub fn decode(service_choice: u8, data: &[u8]) -> Result<Self, ServiceDecodeError> {
        match ConfirmedServiceChoice::from_raw(service_choice) {
            ConfirmedServiceChoice::ReadProperty => Ok(Self::ReadProperty(from_bytes(data)?)),
            ConfirmedServiceChoice::WriteProperty => Ok(Self::WriteProperty(from_bytes(data)?)),
            _ => Err(ServiceDecodeError::UnrecognizedService(service_choice)),
        }
    }

    pub fn choice(&self) -> ConfirmedServiceChoice {
        match self {
            Self::ReadProperty(_) => ConfirmedServiceChoice::ReadProperty,
            Self::WriteProperty(_) => ConfirmedServiceChoice::WriteProperty,
        }
    }
}

/// Decoded unconfirmed service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnconfirmedServiceRequest {
    WhoIs(WhoIsRequest),
    IAm(IAmRequest),
    WhoHas(WhoHasRequest),
    IHave(IHaveRequest),
}

impl UnconfirmedServiceRequest {
    pub fn decode(service_choice: u8, data: &[u8]) -> Result<Self, ServiceDecodeError> {
        match UnconfirmedServiceChoice::from_raw(service_choice) {
            UnconfirmedServiceChoice::WhoIs => Ok(Self::WhoIs(from_bytes(data)?)),
            UnconfirmedServiceChoice::IAm => Ok(Self::IAm(from_bytes(data)?)),
            UnconfirmedServiceChoice::WhoHas => Ok(Self::WhoHas(from_bytes(data)?)),
            UnconfirmedServiceChoice::IHave => Ok(Self::IHave(from_bytes(data)?)),
            _ => Err(ServiceDecodeError::UnrecognizedService(service_choice)),
        }
    }

    pub fn choice(&self) -> UnconfirmedServiceChoice {
        match self {
            Self::WhoIs(_) => UnconfirmedServiceChoice::WhoIs,
            Self::IAm(_) => UnconfirmedServiceChoice::IAm,
            Self::WhoHas(_) => UnconfirmedServiceChoice::WhoHas,
            Self::IHave(_) => UnconfirmedServiceChoice::IHave,
        }
    }
}

/// Decodes a Complex-ACK body for a service whose ack type is known.
pub fn decode_ack<S: ServiceAck>(ack: &ComplexAck) -> Result<S, ServiceDecodeError> {
    if ack.service_choice != S::CHOICE.to_raw() {
        return Err(ServiceDecodeError::UnrecognizedService(ack.service_choice));
    }
    Ok(from_bytes(&ack.data)?)
}
