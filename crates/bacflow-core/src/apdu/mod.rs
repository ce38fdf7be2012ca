//! Application layer PDUs.

/// Service choice enumerations.
pub mod choice;
/// Confirmed-service request, ack, error, reject and abort PDUs.
pub mod confirmed;
/// APDU type discriminant.
pub mod pdu;
/// Abort and reject reasons.
pub mod reason;
/// Unconfirmed-service request PDU.
pub mod unconfirmed;

pub use choice::{ConfirmedServiceChoice, UnconfirmedServiceChoice};
pub use confirmed::{AbortPdu, ComplexAck, ConfirmedRequest, ErrorPdu, RejectPdu, SegmentAck, SimpleAck};
pub use pdu::ApduType;
pub use reason::{AbortReason, RejectReason};
pub use unconfirmed::UnconfirmedRequest;

use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apdu {
    ConfirmedRequest(ConfirmedRequest),
    UnconfirmedRequest(UnconfirmedRequest),
    SimpleAck(SimpleAck),
    ComplexAck(ComplexAck),
    SegmentAck(SegmentAck),
    Error(ErrorPdu),
    Reject(RejectPdu),
    Abort(AbortPdu),
}

impl Apdu {
    pub fn apdu_type(&self) -> ApduType {
        match self {
            Self::ConfirmedRequest(_) => ApduType::ConfirmedRequest,
            Self::UnconfirmedRequest(_) => ApduType::UnconfirmedRequest,
            Self::SimpleAck(_) => ApduType::SimpleAck,
            Self::ComplexAck(_) => ApduType::ComplexAck,
            Self::SegmentAck(_) => ApduType::SegmentAck,
            Self::Error(_) => ApduType::Error,
            Self::Reject(_) => ApduType::Reject,
            Self::Abort(_) => ApduType::Abort,
        }
    }

    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Self::ConfirmedRequest(p) => Some(p.invoke_id),
            Self::UnconfirmedRequest(_) => None,
            Self::SimpleAck(p) => Some(p.invoke_id),
            Self::ComplexAck(p) => Some(p.invoke_id),
            Self::SegmentAck(p) => Some(p.invoke_id),
            Self::Error(p) => Some(p.invoke_id),
            Self::Reject(p) => Some(p.invoke_id),
            Self::Abort(p) => Some(p.invoke_id),
        }
    }

    /// Whether this PDU travels from the server side of a transaction.
    pub fn from_server(&self) -> bool {
        match self {
            Self::ConfirmedRequest(_) | Self::UnconfirmedRequest(_) => false,
            Self::SegmentAck(p) => p.server,
            Self::Abort(p) => p.server,
            _ => true,
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Self::ConfirmedRequest(p) => p.encode(w),
            Self::UnconfirmedRequest(p) => p.encode(w),
            Self::SimpleAck(p) => p.encode(w),
            Self::ComplexAck(p) => p.encode(w),
            Self::SegmentAck(p) => p.encode(w),
            Self::Error(p) => p.encode(w),
            Self::Reject(p) => p.encode(w),
            Self::Abort(p) => p.encode(w),
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let first = *data.first().ok_or(DecodeError::UnexpectedEof)?;
        let apdu_type = ApduType::of(first).ok_or(DecodeError::InvalidValue)?;
        let mut r = Reader::new(data);
        let apdu = match apdu_type {
            ApduType::ConfirmedRequest => Self::ConfirmedRequest(ConfirmedRequest::decode(&mut r)?),
            ApduType::UnconfirmedRequest => {
                Self::UnconfirmedRequest(UnconfirmedRequest::decode(&mut r)?)
            }
            ApduType::SimpleAck => Self::SimpleAck(SimpleAck::decode(&mut r)?),
            ApduType::ComplexAck => Self::ComplexAck(ComplexAck::decode(&mut r)?),
            ApduType::SegmentAck => Self::SegmentAck(SegmentAck::decode(&mut r)?),
            ApduType::Error => Self::Error(ErrorPdu::decode(&mut r)?),
            ApduType::Reject => Self::Reject(RejectPdu::decode(&mut r)?),
            ApduType::Abort => Self::Abort(AbortPdu::decode(&mut r)?),
        };
        if !r.is_empty() {
            return Err(DecodeError::TrailingData);
        }
        Ok(apdu)
    }
}

#[cfg(test)]
mod tests {
    use super::{AbortPdu, AbortReason, Apdu, ComplexAck, ConfirmedRequest, ConfirmedServiceChoice, SegmentAck};
    use crate::types::{MaxApdu, MaxSegments};
    use crate::DecodeError;

    #[test]
    fn confirmed_request_header_octets() {
        let mut req = ConfirmedRequest::new(7, 12, vec![0x0C]);
        req.segmented_response_accepted = true;
        req.max_segments = MaxSegments::Sixteen;
        req.max_apdu = MaxApdu::UpTo1476;
        let bytes = Apdu::ConfirmedRequest(req.clone()).to_vec().unwrap();
        assert_eq!(bytes, vec![0x02, 0x45, 0x07, 0x0C, 0x0C]);

        match Apdu::decode(&bytes).unwrap() {
            Apdu::ConfirmedRequest(decoded) => {
                assert_eq!(decoded, req);
                assert_eq!(decoded.service(), ConfirmedServiceChoice::ReadProperty);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn segmented_ack_carries_sequence_and_window() {
        let mut ack = ComplexAck::new(3, 12, vec![1, 2, 3]);
        ack.segmented = true;
        ack.more_follows = true;
        ack.sequence_number = 4;
        ack.proposed_window_size = 8;
        let bytes = Apdu::ComplexAck(ack.clone()).to_vec().unwrap();
        assert_eq!(&bytes[..5], &[0x3C, 3, 4, 8, 12]);
        assert_eq!(Apdu::decode(&bytes).unwrap(), Apdu::ComplexAck(ack));
    }

    #[test]
    fn abort_server_bit_and_reason() {
        let abort = Apdu::Abort(AbortPdu {
            server: true,
            invoke_id: 9,
            reason: AbortReason::ApplicationExceededReplyTime,
        });
        assert_eq!(abort.to_vec().unwrap(), vec![0x71, 9, 8]);
        assert!(abort.from_server());

        let nak = Apdu::SegmentAck(SegmentAck {
            negative_ack: true,
            server: false,
            invoke_id: 1,
            sequence_number: 2,
            actual_window_size: 4,
        });
        assert_eq!(nak.to_vec().unwrap(), vec![0x42, 1, 2, 4]);
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(Apdu::decode(&[]).unwrap_err(), DecodeError::UnexpectedEof);
        assert_eq!(Apdu::decode(&[0x80]).unwrap_err(), DecodeError::InvalidValue);
        // max-APDU code 7 is reserved
        assert_eq!(
            Apdu::decode(&[0x00, 0x07, 1, 12]).unwrap_err(),
            DecodeError::InvalidValue
        );
        assert_eq!(Apdu::decode(&[0x20, 1]).unwrap_err(), DecodeError::UnexpectedEof);
        assert_eq!(Apdu::decode(&[0x20, 1, 15, 0]).unwrap_err(), DecodeError::TrailingData);
    }
}
