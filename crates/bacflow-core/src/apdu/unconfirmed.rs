use crate::apdu::{ApduType, UnconfirmedServiceChoice};
use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// Unconfirmed-Request PDU with its service body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedRequest {
    pub service_choice: u8,
    pub data: Vec<u8>,
}

impl UnconfirmedRequest {
    pub fn service(&self) -> UnconfirmedServiceChoice {
        UnconfirmedServiceChoice::from_raw(self.service_choice)
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::UnconfirmedRequest.header_bits())?;
        w.write_u8(self.service_choice)?;
        w.write_all(&self.data)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = r.read_u8()?;
        if ApduType::of(b0) != Some(ApduType::UnconfirmedRequest) {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Self {
            service_choice: r.read_u8()?,
            data: r.read_rest().to_vec(),
        })
    }
}
