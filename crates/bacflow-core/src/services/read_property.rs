use crate::apdu::ConfirmedServiceChoice;
use crate::constructed::{Any, Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::services::{ConfirmedService, ServiceAck};
use crate::types::{ObjectId, PropertyId, Unsigned};
use crate::{DecodeError, EncodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
}

impl ReadPropertyRequest {
    pub fn new(object_id: ObjectId, property_id: PropertyId) -> Self {
        Self {
            object_id,
            property_id,
            array_index: None,
        }
    }

    pub fn with_array_index(mut self, index: u32) -> Self {
        self.array_index = Some(index);
        self
    }
}

impl Sequence for ReadPropertyRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::required("objectIdentifier", Some(0)),
        Element::required("propertyIdentifier", Some(1)),
        Element::optional("propertyArrayIndex", Some(2)),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        enc.element(&self.object_id)?;
        enc.element(&self.property_id)?;
        enc.optional(self.array_index.map(Unsigned).as_ref())
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: dec.element()?,
            property_id: dec.element()?,
            array_index: dec.optional::<Unsigned>()?.map(|v| v.0),
        })
    }
}

crate::impl_sequence_datatype!(ReadPropertyRequest);

impl ConfirmedService for ReadPropertyRequest {
    const CHOICE: ConfirmedServiceChoice = ConfirmedServiceChoice::ReadProperty;
}

/// ReadProperty result; the value stays type-erased until the caller
/// knows which datatype the property holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyAck {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: Any,
}

impl ReadPropertyAck {
    pub fn for_request(request: &ReadPropertyRequest, value: Any) -> Self {
        Self {
            object_id: request.object_id,
            property_id: request.property_id,
            array_index: request.array_index,
            value,
        }
    }
}

impl Sequence for ReadPropertyAck {
    const ELEMENTS: &'static [Element] = &[
        Element::required("objectIdentifier", Some(0)),
        Element::required("propertyIdentifier", Some(1)),
        Element::optional("propertyArrayIndex", Some(2)),
        Element::required("propertyValue", Some(3)),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        enc.element(&self.object_id)?;
        enc.element(&self.property_id)?;
        enc.optional(self.array_index.map(Unsigned).as_ref())?;
        enc.element(&self.value)
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: dec.element()?,
            property_id: dec.element()?,
            array_index: dec.optional::<Unsigned>()?.map(|v| v.0),
            value: dec.element()?,
        })
    }
}

crate::impl_sequence_datatype!(ReadPropertyAck);

impl ServiceAck for ReadPropertyAck {
    const CHOICE: ConfirmedServiceChoice = ConfirmedServiceChoice::ReadProperty;
}

#[cfg(test)]
mod tests {
    use super::{ReadPropertyAck, ReadPropertyRequest};
    use crate::constructed::{Any, ArrayOf};
    use crate::datatype::{from_bytes, to_bytes};
    use crate::types::{ObjectId, ObjectType, PropertyId, Real, Unsigned};
    use crate::DecodeError;

    #[test]
    fn request_wire_form() {
        let req = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogInput, 1),
            PropertyId::PresentValue,
        );
        let bytes = to_bytes(&req).unwrap();
        assert_eq!(bytes, vec![0x0C, 0x00, 0x00, 0x00, 0x01, 0x19, 0x55]);
        assert_eq!(from_bytes::<ReadPropertyRequest>(&bytes).unwrap(), req);

        let indexed = req.with_array_index(0);
        let bytes = to_bytes(&indexed).unwrap();
        assert_eq!(&bytes[7..], &[0x29, 0x00]);
    }

    #[test]
    fn ack_value_is_wrapped_in_context_three() {
        let req = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogValue, 2),
            PropertyId::PresentValue,
        );
        let ack = ReadPropertyAck::for_request(&req, Any::cast_in(&Real(72.5)).unwrap());
        let bytes = to_bytes(&ack).unwrap();
        assert_eq!(
            &bytes[7..],
            &[0x3E, 0x44, 0x42, 0x91, 0x00, 0x00, 0x3F]
        );
        let decoded = from_bytes::<ReadPropertyAck>(&bytes).unwrap();
        assert_eq!(decoded.value.cast_out::<Real>().unwrap(), Real(72.5));
    }

    #[test]
    fn ack_carries_constructed_values() {
        let list = ArrayOf::new(vec![Unsigned(1), Unsigned(2), Unsigned(3)]);
        let ack = ReadPropertyAck {
            object_id: ObjectId::new(ObjectType::Device, 1),
            property_id: PropertyId::ObjectList,
            array_index: None,
            value: Any::cast_in(&list).unwrap(),
        };
        let decoded = from_bytes::<ReadPropertyAck>(&to_bytes(&ack).unwrap()).unwrap();
        assert_eq!(decoded.value.cast_out::<ArrayOf<Unsigned>>().unwrap(), list);
    }

    #[test]
    fn missing_property_is_named() {
        assert_eq!(
            from_bytes::<ReadPropertyRequest>(&[0x0C, 0x00, 0x00, 0x00, 0x01]).unwrap_err(),
            DecodeError::MissingRequiredElement("propertyIdentifier")
        );
    }
}
