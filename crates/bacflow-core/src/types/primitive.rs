use crate::datatype::Atomic;
use crate::encoding::primitives::{signed_from_octets, signed_octets, unsigned_from_octets, unsigned_octets};
use crate::encoding::{AppTag, Tag};
use crate::{DecodeError, EncodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Boolean(pub bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unsigned(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Integer(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Real(pub f32);

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Double(pub f64);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OctetString(pub Vec<u8>);

/// Character string; decoded from UTF-8 or ISO-8859-1 and always sent as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacterString(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitString {
    pub bits: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Enumerated(pub u32);

const CHARSET_UTF8: u8 = 0;
const CHARSET_ISO_8859_1: u8 = 5;

impl Atomic for Null {
    const APP_TAG: AppTag = AppTag::Null;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::Null, Vec::new()))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        if !tag.data.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Null)
    }
}

impl Atomic for Boolean {
    const APP_TAG: AppTag = AppTag::Boolean;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::app_boolean(self.0))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        match tag.lvt {
            0 => Ok(Boolean(false)),
            1 => Ok(Boolean(true)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl Atomic for Unsigned {
    const APP_TAG: AppTag = AppTag::UnsignedInt;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::UnsignedInt, unsigned_octets(self.0)))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        unsigned_from_octets(&tag.data).map(Unsigned)
    }
}

impl Atomic for Integer {
    const APP_TAG: AppTag = AppTag::SignedInt;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::SignedInt, signed_octets(self.0)))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        signed_from_octets(&tag.data).map(Integer)
    }
}

impl Atomic for Real {
    const APP_TAG: AppTag = AppTag::Real;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::Real, self.0.to_be_bytes().to_vec()))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        let bytes: [u8; 4] = tag
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidLength)?;
        Ok(Real(f32::from_be_bytes(bytes)))
    }
}

impl Atomic for Double {
    const APP_TAG: AppTag = AppTag::Double;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::Double, self.0.to_be_bytes().to_vec()))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        let bytes: [u8; 8] = tag
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidLength)?;
        Ok(Double(f64::from_be_bytes(bytes)))
    }
}

impl Atomic for OctetString {
    const APP_TAG: AppTag = AppTag::OctetString;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::OctetString, self.0.clone()))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        Ok(OctetString(tag.data.clone()))
    }
}

impl Atomic for CharacterString {
    const APP_TAG: AppTag = AppTag::CharacterString;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        let mut data = Vec::with_capacity(self.0.len() + 1);
        data.push(CHARSET_UTF8);
        data.extend_from_slice(self.0.as_bytes());
        Ok(Tag::application(AppTag::CharacterString, data))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        let (charset, text) = tag.data.split_first().ok_or(DecodeError::InvalidLength)?;
        match *charset {
            CHARSET_UTF8 => std::str::from_utf8(text)
                .map(|s| CharacterString(s.to_owned()))
                .map_err(|_| DecodeError::InvalidValue),
            CHARSET_ISO_8859_1 => Ok(CharacterString(text.iter().map(|&b| b as char).collect())),
            _ => Err(DecodeError::Unsupported),
        }
    }
}

impl Atomic for BitString {
    const APP_TAG: AppTag = AppTag::BitString;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        let octets = self.bits.len().div_ceil(8);
        let unused = (octets * 8 - self.bits.len()) as u8;
        let mut data = vec![0u8; octets + 1];
        data[0] = unused;
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                data[1 + i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(Tag::application(AppTag::BitString, data))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        let (unused, octets) = tag.data.split_first().ok_or(DecodeError::InvalidLength)?;
        if *unused > 7 || (octets.is_empty() && *unused != 0) {
            return Err(DecodeError::InvalidValue);
        }
        let count = octets.len() * 8 - *unused as usize;
        let bits = (0..count)
            .map(|i| octets[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect();
        Ok(BitString { bits })
    }
}

impl Atomic for Enumerated {
    const APP_TAG: AppTag = AppTag::Enumerated;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(AppTag::Enumerated, unsigned_octets(self.0)))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        unsigned_from_octets(&tag.data).map(Enumerated)
    }
}

impl_atomic_datatype!(
    Null,
    Boolean,
    Unsigned,
    Integer,
    Real,
    Double,
    OctetString,
    CharacterString,
    BitString,
    Enumerated,
);

impl From<&str> for CharacterString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<u32> for Unsigned {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl BitString {
    pub fn new(bits: impl Into<Vec<bool>>) -> Self {
        Self { bits: bits.into() }
    }
}
