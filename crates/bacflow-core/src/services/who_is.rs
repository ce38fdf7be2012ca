use crate::apdu::UnconfirmedServiceChoice;
use crate::constructed::{Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::services::UnconfirmedService;
use crate::types::Unsigned;
use crate::{DecodeError, EncodeError};

/// Who-Is, optionally limited to a device instance range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WhoIsRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
}

impl WhoIsRequest {
    pub const fn global() -> Self {
        Self {
            low_limit: None,
            high_limit: None,
        }
    }

    pub const fn range(low: u32, high: u32) -> Self {
        Self {
            low_limit: Some(low),
            high_limit: Some(high),
        }
    }

    /// Whether a device with `instance` should answer.
    pub fn matches(&self, instance: u32) -> bool {
        match (self.low_limit, self.high_limit) {
            (Some(low), Some(high)) => (low..=high).contains(&instance),
            _ => true,
        }
    }
}

impl Sequence for WhoIsRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::optional("deviceInstanceRangeLowLimit", Some(0)),
        Element::optional("deviceInstanceRangeHighLimit", Some(1)),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        if self.low_limit.is_some() != self.high_limit.is_some() {
            return Err(EncodeError::Message("low/high limits must be both set or absent"));
        }
        enc.optional(self.low_limit.map(Unsigned).as_ref())?;
        enc.optional(self.high_limit.map(Unsigned).as_ref())
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        let low_limit = dec.optional::<Unsigned>()?.map(|v| v.0);
        let high_limit = dec.optional::<Unsigned>()?.map(|v| v.0);
        if low_limit.is_some() != high_limit.is_some() {
            return Err(DecodeError::MissingRequiredElement("deviceInstanceRangeHighLimit"));
        }
        Ok(Self {
            low_limit,
            high_limit,
        })
    }
}

crate::impl_sequence_datatype!(WhoIsRequest);

impl UnconfirmedService for WhoIsRequest {
    const CHOICE: UnconfirmedServiceChoice = UnconfirmedServiceChoice::WhoIs;
}
