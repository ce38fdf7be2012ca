use crate::datatype::Datatype;
use crate::encoding::{Tag, TagList};
use crate::{DecodeError, EncodeError};

/// One slot in a constructed type's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub name: &'static str,
    pub context: Option<u8>,
    pub optional: bool,
}

impl Element {
    pub const fn required(name: &'static str, context: Option<u8>) -> Self {
        Self {
            name,
            context,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, context: Option<u8>) -> Self {
        Self {
            name,
            context,
            optional: true,
        }
    }
}

/// A record whose elements are encoded in schema order.
///
/// Implementors list their schema in [`Sequence::ELEMENTS`] and move each
/// field through the encoder/decoder in that order; the helpers check
/// presence and tagging against the schema.
pub trait Sequence: Sized {
    const ELEMENTS: &'static [Element];

    fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError>;

    fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError>;
}

pub struct SequenceEncoder<'a> {
    tags: &'a mut TagList,
    schema: &'static [Element],
    index: usize,
}

impl<'a> SequenceEncoder<'a> {
    fn new(tags: &'a mut TagList, schema: &'static [Element]) -> Self {
        Self {
            tags,
            schema,
            index: 0,
        }
    }

    fn next_element(&mut self) -> Result<Element, EncodeError> {
        let element = *self
            .schema
            .get(self.index)
            .ok_or(EncodeError::Message("more values than schema elements"))?;
        self.index += 1;
        Ok(element)
    }

    pub fn element<T: Datatype>(&mut self, value: &T) -> Result<(), EncodeError> {
        let element = self.next_element()?;
        value.encode_tags(self.tags, element.context)
    }

    pub fn optional<T: Datatype>(&mut self, value: Option<&T>) -> Result<(), EncodeError> {
        let element = self.next_element()?;
        match value {
            Some(value) => value.encode_tags(self.tags, element.context),
            None if element.optional => Ok(()),
            None => Err(EncodeError::MissingRequiredElement(element.name)),
        }
    }
}

pub struct SequenceDecoder<'a> {
    tags: &'a mut TagList,
    schema: &'static [Element],
    index: usize,
}

impl<'a> SequenceDecoder<'a> {
    fn new(tags: &'a mut TagList, schema: &'static [Element]) -> Self {
        Self {
            tags,
            schema,
            index: 0,
        }
    }

    fn next_element(&mut self) -> Result<Element, DecodeError> {
        let element = *self
            .schema
            .get(self.index)
            .ok_or(DecodeError::Message("more values than schema elements"))?;
        self.index += 1;
        Ok(element)
    }

    pub fn element<T: Datatype>(&mut self) -> Result<T, DecodeError> {
        let element = self.next_element()?;
        if !T::is_next(self.tags, element.context) {
            return Err(DecodeError::MissingRequiredElement(element.name));
        }
        T::decode_tags(self.tags, element.context)
    }

    /// Decodes the element if the next tag belongs to it, otherwise skips it.
    pub fn optional<T: Datatype>(&mut self) -> Result<Option<T>, DecodeError> {
        let element = self.next_element()?;
        if !T::is_next(self.tags, element.context) {
            if element.optional {
                return Ok(None);
            }
            return Err(DecodeError::MissingRequiredElement(element.name));
        }
        T::decode_tags(self.tags, element.context).map(Some)
    }
}

pub fn encode_sequence<S: Sequence>(
    value: &S,
    tags: &mut TagList,
    context: Option<u8>,
) -> Result<(), EncodeError> {
    if let Some(n) = context {
        tags.push(Tag::opening(n));
    }
    value.encode_elements(&mut SequenceEncoder::new(tags, S::ELEMENTS))?;
    if let Some(n) = context {
        tags.push(Tag::closing(n));
    }
    Ok(())
}

pub fn decode_sequence<S: Sequence>(
    tags: &mut TagList,
    context: Option<u8>,
) -> Result<S, DecodeError> {
    match context {
        Some(n) => {
            let mut inner = tags.get_context(n)?;
            let value = S::decode_elements(&mut SequenceDecoder::new(&mut inner, S::ELEMENTS))?;
            if !inner.is_empty() {
                return Err(DecodeError::TrailingData);
            }
            Ok(value)
        }
        None => S::decode_elements(&mut SequenceDecoder::new(tags, S::ELEMENTS)),
    }
}

pub fn sequence_is_next<S: Sequence>(tags: &TagList, context: Option<u8>) -> bool {
    match (tags.peek(), context) {
        (Some(tag), Some(n)) => tag.is_opening(n),
        (Some(_), None) => true,
        (None, _) => S::ELEMENTS.iter().all(|e| e.optional),
    }
}

/// Implements [`Datatype`](crate::datatype::Datatype) for a [`Sequence`].
#[macro_export]
macro_rules! impl_sequence_datatype {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::datatype::Datatype for $t {
                fn encode_tags(
                    &self,
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<(), $crate::EncodeError> {
                    $crate::constructed::encode_sequence(self, tags, context)
                }

                fn decode_tags(
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<Self, $crate::DecodeError> {
                    $crate::constructed::decode_sequence(tags, context)
                }

                fn is_next(tags: &$crate::encoding::TagList, context: Option<u8>) -> bool {
                    $crate::constructed::sequence_is_next::<Self>(tags, context)
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::{Element, Sequence, SequenceDecoder, SequenceEncoder};
    use crate::datatype::{decode_value, encode_value, from_bytes, to_bytes, Datatype};
    use crate::encoding::TagList;
    use crate::types::{CharacterString, Real, Unsigned};
    use crate::{DecodeError, EncodeError};

    #[derive(Debug, Clone, PartialEq)]
    struct Setpoint {
        id: Unsigned,
        label: Option<CharacterString>,
        value: Real,
    }

    impl Sequence for Setpoint {
        const ELEMENTS: &'static [Element] = &[
            Element::required("id", Some(0)),
            Element::optional("label", Some(1)),
            Element::required("value", Some(2)),
        ];

        fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
            enc.element(&self.id)?;
            enc.optional(self.label.as_ref())?;
            enc.element(&self.value)
        }

        fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
            Ok(Self {
                id: dec.element()?,
                label: dec.optional()?,
                value: dec.element()?,
            })
        }
    }

    impl_sequence_datatype!(Setpoint);

    #[derive(Debug, PartialEq)]
    struct Wrapper {
        inner: Setpoint,
        count: Unsigned,
    }

    impl Sequence for Wrapper {
        const ELEMENTS: &'static [Element] = &[
            Element::required("inner", Some(4)),
            Element::required("count", None),
        ];

        fn encode_elements(&self, enc: &mut SequenceEncoder<'_>) -> Result<(), EncodeError> {
            enc.element(&self.inner)?;
            enc.element(&self.count)
        }

        fn decode_elements(dec: &mut SequenceDecoder<'_>) -> Result<Self, DecodeError> {
            Ok(Self {
                inner: dec.element()?,
                count: dec.element()?,
            })
        }
    }

    impl_sequence_datatype!(Wrapper);

    #[test]
    fn optional_element_is_skipped_when_absent() {
        let value = Setpoint {
            id: Unsigned(7),
            label: None,
            value: Real(1.5),
        };
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(bytes, vec![0x09, 0x07, 0x2C, 0x3F, 0xC0, 0x00, 0x00]);
        assert_eq!(from_bytes::<Setpoint>(&bytes).unwrap(), value);
    }

    #[test]
    fn missing_required_element_is_named() {
        // only element 0 and the optional element 1
        let bytes = [0x09, 0x07, 0x1A, 0x00, b'x'];
        let err = from_bytes::<Setpoint>(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::MissingRequiredElement("value"));
    }

    #[test]
    fn context_tagged_member_is_wrapped() {
        let value = Wrapper {
            inner: Setpoint {
                id: Unsigned(1),
                label: Some(CharacterString::from("a")),
                value: Real(0.0),
            },
            count: Unsigned(2),
        };
        let tags = encode_value(&value).unwrap();
        let first = tags.peek().unwrap();
        assert!(first.is_opening(4));
        assert!(Setpoint::is_next(&tags, Some(4)));
        assert_eq!(decode_value::<Wrapper>(tags).unwrap(), value);

        let mut truncated = TagList::decode(&[0x4E, 0x09, 0x01, 0x4F]).unwrap();
        assert_eq!(
            Setpoint::decode_tags(&mut truncated, Some(4)).unwrap_err(),
            DecodeError::MissingRequiredElement("value")
        );
    }
}
