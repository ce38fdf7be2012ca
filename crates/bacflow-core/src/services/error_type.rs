use crate::constructed::{Element, Sequence, SequenceDecoder, SequenceEncoder};
use crate::datatype::decode_atomic;
use crate::encoding::TagList;
use crate::types::{ErrorClass, ErrorCode};
use crate::{DecodeError, EncodeError};

/// Error class and code carried in an Error PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorType {
    pub class: ErrorClass,
    pub code: ErrorCode,
}

impl ErrorType {
    pub const fn new(class: ErrorClass, code: ErrorCode) -> Self {
        Self { class, code }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        crate::datatype::to_bytes(self)
    }

    /// Decodes an Error PDU body.
    ///
    /// Plain application-tagged class/code is the normal form. Some services
    /// wrap the pair in opening/closing tag 0, and some devices send it
    /// context-tagged; both are accepted.
    pub fn from_error_body(data: &[u8]) -> Result<Self, DecodeError> {
        let mut tags = TagList::decode(data)?;
        if tags.peek().is_some_and(|tag| tag.is_opening(0)) {
            tags = tags.get_context(0)?;
        }
        let class = decode_atomic::<ErrorClass>(&mut tags, None)
            .or_else(|_| decode_atomic::<ErrorClass>(&mut tags, Some(0)))?;
        let code = decode_atomic::<ErrorCode>(&mut tags, None)
            .or_else(|_| decode_atomic::<ErrorCode>(&mut tags, Some(1)))?;
        Ok(Self { class, code })
    }
}

impl Sequence for ErrorType {
    const ELEMENTS: &'static [Element] = &[
        Element::required("errorClass", None),
        Element::required("errorCode", None),
    ];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
        enc.element(&self.class)?;
        enc.element(&self.code)
    }

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            class: dec.element()?,
            code: dec.element()?,
        })
    }
}

crate::impl_sequence_datatype!(ErrorType);

impl core::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.class, self.code)
    }
}
