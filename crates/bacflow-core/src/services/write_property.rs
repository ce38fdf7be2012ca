use crate::apdu::ConfirmedServiceChoice;
use crate::constructed::{Any, Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::services::ConfirmedService;
use crate::types::{ObjectId, PropertyId, Unsigned};
use crate::{DecodeError, EncodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: Any,
    /// Command priority, 1 (highest) to 16.
    pub priority: Option<u8>,
}

impl WritePropertyRequest {
    pub fn new(object_id: ObjectId, property_id: PropertyId, value: Any) -> Self {
        Self {
            object_id,
            property_id,
            array_index: None,
            value,
            priority: None,
        }
    }
}

impl Sequence for WritePropertyRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::required("objectIdentifier", Some(0)),
        Element::required("propertyIdentifier", Some(1)),
        Element::optional("propertyArrayIndex", Some(2)),
        Element::required("propertyValue", Some(3)),
        Element::optional("priority", Some(4)),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        if let Some(priority) = self.priority {
            if !(1..=16).contains(&priority) {
                return Err(EncodeError::ValueOutOfRange);
            }
        }
        enc.element(&self.object_id)?;
        enc.element(&self.property_id)?;
        enc.optional(self.array_index.map(Unsigned).as_ref())?;
        enc.element(&self.value)?;
        enc.optional(self.priority.map(|p| Unsigned(u32::from(p))).as_ref())
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        let object_id = dec.element()?;
        let property_id = dec.element()?;
        let array_index = dec.optional::<Unsigned>()?.map(|v| v.0);
        let value = dec.element()?;
        let priority = match dec.optional::<Unsigned>()? {
            Some(Unsigned(p @ 1..=16)) => Some(p as u8),
            Some(_) => return Err(DecodeError::InvalidValue),
            None => None,
        };
        Ok(Self {
            object_id,
            property_id,
            array_index,
            value,
            priority,
        })
    }
}

crate::impl_sequence_datatype!(WritePropertyRequest);

impl ConfirmedService for WritePropertyRequest {
    const CHOICE: ConfirmedServiceChoice = ConfirmedServiceChoice::WriteProperty;
}
