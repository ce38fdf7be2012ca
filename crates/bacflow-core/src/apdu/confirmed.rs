use crate::apdu::{AbortReason, ApduType, ConfirmedServiceChoice, RejectReason};
use crate::encoding::{reader::Reader, writer::Writer};
use crate::types::{MaxApdu, MaxSegments};
use crate::{DecodeError, EncodeError};

const SEGMENTED: u8 = 0b0000_1000;
const MORE_FOLLOWS: u8 = 0b0000_0100;
const SEGMENTED_RESPONSE_ACCEPTED: u8 = 0b0000_0010;

fn check_type(b0: u8, expected: ApduType) -> Result<(), DecodeError> {
    if ApduType::of(b0) != Some(expected) {
        return Err(DecodeError::InvalidValue);
    }
    Ok(())
}

/// Confirmed-Request PDU; `data` is the service request body, or one
/// segment of it when `segmented` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedRequest {
    pub segmented: bool,
    pub more_follows: bool,
    pub segmented_response_accepted: bool,
    pub max_segments: MaxSegments,
    pub max_apdu: MaxApdu,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub proposed_window_size: u8,
    pub service_choice: u8,
    pub data: Vec<u8>,
}

impl ConfirmedRequest {
    pub fn new(invoke_id: u8, service_choice: u8, data: Vec<u8>) -> Self {
        Self {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: false,
            max_segments: MaxSegments::Unspecified,
            max_apdu: MaxApdu::UpTo1476,
            invoke_id,
            sequence_number: 0,
            proposed_window_size: 1,
            service_choice,
            data,
        }
    }

    pub fn service(&self) -> ConfirmedServiceChoice {
        ConfirmedServiceChoice::from_raw(self.service_choice)
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut b0 = ApduType::ConfirmedRequest.header_bits();
        if self.segmented {
            b0 |= SEGMENTED;
        }
        if self.more_follows {
            b0 |= MORE_FOLLOWS;
        }
        if self.segmented_response_accepted {
            b0 |= SEGMENTED_RESPONSE_ACCEPTED;
        }

        w.write_u8(b0)?;
        w.write_u8((self.max_segments.code() << 4) | self.max_apdu.code())?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number)?;
            w.write_u8(self.proposed_window_size)?;
        }
        w.write_u8(self.service_choice)?;
        w.write_all(&self.data)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        check_type(b0, ApduType::ConfirmedRequest)?;
        let segmented = (b0 & SEGMENTED) != 0;
        let seg_apdu = r.read_u8()?;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (r.read_u8()?, r.read_u8()?)
        } else {
            (0, 1)
        };
        let service_choice = r.read_u8()?;
        Ok(Self {
            segmented,
            more_follows: (b0 & MORE_FOLLOWS) != 0,
            segmented_response_accepted: (b0 & SEGMENTED_RESPONSE_ACCEPTED) != 0,
            max_segments: MaxSegments::from_code((seg_apdu >> 4) & 0x07),
            max_apdu: MaxApdu::from_code(seg_apdu & 0x0f).ok_or(DecodeError::InvalidValue)?,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice,
            data: r.read_rest().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexAck {
    pub segmented: bool,
    pub more_follows: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub proposed_window_size: u8,
    pub service_choice: u8,
    pub data: Vec<u8>,
}

impl ComplexAck {
    pub fn new(invoke_id: u8, service_choice: u8, data: Vec<u8>) -> Self {
        Self {
            segmented: false,
            more_follows: false,
            invoke_id,
            sequence_number: 0,
            proposed_window_size: 1,
            service_choice,
            data,
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut b0 = ApduType::ComplexAck.header_bits();
        if self.segmented {
            b0 |= SEGMENTED;
        }
        if self.more_follows {
            b0 |= MORE_FOLLOWS;
        }
        w.write_u8(b0)?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number)?;
            w.write_u8(self.proposed_window_size)?;
        }
        w.write_u8(self.service_choice)?;
        w.write_all(&self.data)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        check_type(b0, ApduType::ComplexAck)?;

        let segmented = (b0 & SEGMENTED) != 0;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (r.read_u8()?, r.read_u8()?)
        } else {
            (0, 1)
        };
        let service_choice = r.read_u8()?;

        Ok(Self {
            segmented,
            more_follows: (b0 & MORE_FOLLOWS) != 0,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice,
            data: r.read_rest().to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleAck {
    pub invoke_id: u8,
    pub service_choice: u8,
}

impl SimpleAck {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::SimpleAck.header_bits())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        check_type(r.read_u8()?, ApduType::SimpleAck)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            service_choice: r.read_u8()?,
        })
    }
}

/// Error PDU; `data` holds the error body (class and code for most services).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPdu {
    pub invoke_id: u8,
    pub service_choice: u8,
    pub data: Vec<u8>,
}

impl ErrorPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Error.header_bits())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)?;
        w.write_all(&self.data)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        check_type(r.read_u8()?, ApduType::Error)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            service_choice: r.read_u8()?,
            data: r.read_rest().to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPdu {
    pub invoke_id: u8,
    pub reason: RejectReason,
}

impl RejectPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Reject.header_bits())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason.to_raw())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        check_type(r.read_u8()?, ApduType::Reject)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            reason: RejectReason::from_raw(r.read_u8()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPdu {
    /// Set when the server side of the transaction sent the abort.
    pub server: bool,
    pub invoke_id: u8,
    pub reason: AbortReason,
}

impl AbortPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Abort.header_bits() | u8::from(self.server))?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason.to_raw())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        check_type(b0, ApduType::Abort)?;
        Ok(Self {
            server: (b0 & 0x01) != 0,
            invoke_id: r.read_u8()?,
            reason: AbortReason::from_raw(r.read_u8()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAck {
    pub negative_ack: bool,
    pub server: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub actual_window_size: u8,
}

impl SegmentAck {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut b0 = ApduType::SegmentAck.header_bits();
        if self.negative_ack {
            b0 |= 0b0000_0010;
        }
        if self.server {
            b0 |= 0b0000_0001;
        }
        w.write_u8(b0)?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.sequence_number)?;
        w.write_u8(self.actual_window_size)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        check_type(b0, ApduType::SegmentAck)?;
        Ok(Self {
            negative_ack: (b0 & 0b0000_0010) != 0,
            server: (b0 & 0b0000_0001) != 0,
            invoke_id: r.read_u8()?,
            sequence_number: r.read_u8()?,
            actual_window_size: r.read_u8()?,
        })
    }
}
