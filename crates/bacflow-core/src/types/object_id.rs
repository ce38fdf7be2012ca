use crate::datatype::Atomic;
use crate::encoding::{AppTag, Tag};
use crate::types::ObjectType;
use crate::{DecodeError, EncodeError};
use core::fmt;
use core::str::FromStr;

/// Packed object identifier: 10-bit type, 22-bit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(u32);

impl ObjectId {
    /// Instance number reserved to mean "the local device" in requests.
    pub const WILDCARD_INSTANCE: u32 = 0x3F_FFFF;

    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self((((object_type.to_raw() as u32) & 0x03FF) << 22) | (instance & 0x3F_FFFF))
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn object_type(self) -> ObjectType {
        ObjectType::from_raw(((self.0 >> 22) & 0x03FF) as u16)
    }

    pub const fn instance(self) -> u32 {
        self.0 & 0x3F_FFFF
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.object_type(), self.instance())
    }
}

/// Parses `"analog-input,3"` or `"0,3"`.
impl FromStr for ObjectId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, instance) = s.split_once(',').ok_or(DecodeError::InvalidValue)?;
        let object_type: ObjectType = kind.trim().parse()?;
        let instance: u32 = instance
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidValue)?;
        if instance > 0x3F_FFFF || object_type.to_raw() > 0x03FF {
            return Err(DecodeError::InvalidValue);
        }
        Ok(Self::new(object_type, instance))
    }
}

impl Atomic for ObjectId {
    const APP_TAG: AppTag = AppTag::ObjectId;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::ObjectId, self.0.to_be_bytes().to_vec()))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        let bytes: [u8; 4] = tag
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidLength)?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl_atomic_datatype!(ObjectId);

#[cfg(test)]
mod tests {
    use super::ObjectId;
    use crate::datatype::to_bytes;
    use crate::types::ObjectType;

    #[test]
    fn packs_type_and_instance() {
        let id = ObjectId::new(ObjectType::Device, 1000);
        assert_eq!(id.raw(), 0x0200_03E8);
        assert_eq!(id.object_type(), ObjectType::Device);
        assert_eq!(id.instance(), 1000);
        assert_eq!(to_bytes(&id).unwrap(), vec![0xC4, 0x02, 0x00, 0x03, 0xE8]);
    }

    #[test]
    fn parses_text_form() {
        let id: ObjectId = "analog-input,3".parse().unwrap();
        assert_eq!(id, ObjectId::new(ObjectType::AnalogInput, 3));
        assert_eq!(id.to_string(), "analog-input,3");
        assert_eq!("8,12".parse::<ObjectId>().unwrap().object_type(), ObjectType::Device);
        assert!("device".parse::<ObjectId>().is_err());
        assert!("device,4194304".parse::<ObjectId>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_the_packed_value() {
        let id = ObjectId::new(ObjectType::Device, 1000);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "33555432");
        assert_eq!(serde_json::from_str::<ObjectId>(&json).unwrap(), id);
    }
}
