use crate::apdu::UnconfirmedServiceChoice;
use crate::constructed::{Choice, Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::datatype::Datatype;
use crate::encoding::TagList;
use crate::services::UnconfirmedService;
use crate::types::{CharacterString, ObjectId, Unsigned};
use crate::{DecodeError, EncodeError};

/// The object a Who-Has is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoHasObject {
    ObjectId(ObjectId),
    ObjectName(String),
}

impl Choice for WhoHasObject {
    const CHOICES: &'static [Element] = &[
        Element::required("objectIdentifier", Some(2)),
        Element::required("objectName", Some(3)),
    ];

    fn encode_choice(&self, tags: &mut TagList) -> Result<(), EncodeError> {
        match self {
            Self::ObjectId(id) => id.encode_tags(tags, Some(2)),
            Self::ObjectName(name) => CharacterString(name.clone()).encode_tags(tags, Some(3)),
        }
    }

    fn decode_choice(tags: &mut TagList, element: &'static Element) -> Result<Self, DecodeError> {
        match element.context {
            Some(2) => ObjectId::decode_tags(tags, Some(2)).map(Self::ObjectId),
            _ => CharacterString::decode_tags(tags, Some(3)).map(|s| Self::ObjectName(s.0)),
        }
    }
}

crate::impl_choice_datatype!(WhoHasObject);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoHasRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
    pub object: WhoHasObject,
}

impl WhoHasRequest {
    pub fn for_object_id(object_id: ObjectId) -> Self {
        Self {
            low_limit: None,
            high_limit: None,
            object: WhoHasObject::ObjectId(object_id),
        }
    }

    pub fn for_object_name(object_name: impl Into<String>) -> Self {
        Self {
            low_limit: None,
            high_limit: None,
            object: WhoHasObject::ObjectName(object_name.into()),
        }
    }

    pub fn matches_device(&self, instance: u32) -> bool {
        match (self.low_limit, self.high_limit) {
            (Some(low), Some(high)) => (low..=high).contains(&instance),
            _ => true,
        }
    }
}

impl Sequence for WhoHasRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::optional("deviceInstanceRangeLowLimit", Some(0)),
        Element::optional("deviceInstanceRangeHighLimit", Some(1)),
        Element::required("object", None),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        if self.low_limit.is_some() != self.high_limit.is_some() {
            return Err(EncodeError::Message("low/high limits must be both set or absent"));
        }
        enc.optional(self.low_limit.map(Unsigned).as_ref())?;
        enc.optional(self.high_limit.map(Unsigned).as_ref())?;
        enc.element(&self.object)
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
            object: dec.element()?,
        })
    }
}

crate::impl_sequence_datatype!(WhoHasRequest);

impl UnconfirmedService for WhoHasRequest {
    const CHOICE: UnconfirmedServiceChoice = UnconfirmedServiceChoice::WhoHas;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IHaveRequest {
    pub device_id: ObjectId,
    pub object_id: ObjectId,
    pub object_name: String,
}

impl Sequence for IHaveRequest {
    const ELEMENTS: &'static [Element] = &[
        Element::required("deviceIdentifier", None),
        Element::required("objectIdentifier", None),
        Element::required("objectName", None),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        enc.element(&self.device_id)?;
        enc.element(&self.object_id)?;
        enc.element(&CharacterString(self.object_name.clone()))
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            device_id: dec.element()?,
            object_id: dec.element()?,
            object_name: dec.element::<CharacterString>()?.0,
        })
    }
}

crate::impl_sequence_datatype!(IHaveRequest);

impl UnconfirmedService for IHaveRequest {
    const CHOICE: UnconfirmedServiceChoice = UnconfirmedServiceChoice::IHave;
}

#[cfg(test)]
mod tests {
    use super::{IHaveRequest, WhoHasObject, WhoHasRequest};
    use crate::datatype::{from_bytes, to_bytes};
    use crate::types::{ObjectId, ObjectType};
    use crate::DecodeError;

    #[test]
    fn who_has_by_name_selects_context_three() {
        let req = WhoHasRequest::for_object_name("AHU-1");
        let bytes = to_bytes(&req).unwrap();
        assert_eq!(bytes[0], 0x3D);
        assert_eq!(from_bytes::<WhoHasRequest>(&bytes).unwrap(), req);
    }

    #[test]
    fn who_has_by_id_with_range() {
        let mut req = WhoHasRequest::for_object_id(ObjectId::new(ObjectType::AnalogInput, 3));
        req.low_limit = Some(1);
        req.high_limit = Some(9);
        let bytes = to_bytes(&req).unwrap();
        assert_eq!(bytes, vec![0x09, 1, 0x19, 9, 0x2C, 0x00, 0x00, 0x00, 0x03]);
        let decoded = from_bytes::<WhoHasRequest>(&bytes).unwrap();
        assert!(matches!(decoded.object, WhoHasObject::ObjectId(id) if id.instance() == 3));
        assert!(decoded.matches_device(9));
        assert!(!decoded.matches_device(10));
    }

    #[test]
    fn who_has_without_object_fails() {
        assert_eq!(
            from_bytes::<WhoHasRequest>(&[]).unwrap_err(),
            DecodeError::MissingRequiredElement("object")
        );
    }

    #[test]
    fn i_have_is_application_tagged() {
        let req = IHaveRequest {
            device_id: ObjectId::new(ObjectType::Device, 7),
            object_id: ObjectId::new(ObjectType::BinaryValue, 2),
            object_name: "pump".into(),
        };
        let bytes = to_bytes(&req).unwrap();
        assert_eq!(&bytes[..5], &[0xC4, 0x02, 0x00, 0x00, 0x07]);
        assert_eq!(from_bytes::<IHaveRequest>(&bytes).unwrap(), req);
    }
}
