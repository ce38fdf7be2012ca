use crate::constructed::Element;
use crate::encoding::{Tag, TagClass, TagList};
use crate::{DecodeError, EncodeError};

/// A value that is exactly one of several schema alternatives.
pub trait Choice: Sized {
    const CHOICES: &'static [Element];

    /// Appends the selected alternative using its own element tagging.
    fn encode_choice(&self, tags: &mut TagList) -> Result<(), EncodeError>;

    /// Decodes the alternative `element`, already matched against the next tag.
    fn decode_choice(tags: &mut TagList, element: &'static Element) -> Result<Self, DecodeError>;
}

fn selects(element: &Element, tag: &Tag) -> bool {
    match element.context {
        Some(n) => {
            tag.number == n && matches!(tag.class, TagClass::Context | TagClass::Opening)
        }
        None => tag.class == TagClass::Application,
    }
}

pub fn encode_choice<C: Choice>(
    value: &C,
    tags: &mut TagList,
    context: Option<u8>,
) -> Result<(), EncodeError> {
    if let Some(n) = context {
        tags.push(Tag::opening(n));
    }
    value.encode_choice(tags)?;
    if let Some(n) = context {
        tags.push(Tag::closing(n));
    }
    Ok(())
}

pub fn decode_choice<C: Choice>(tags: &mut TagList, context: Option<u8>) -> Result<C, DecodeError> {
    match context {
        Some(n) => {
            let mut inner = tags.get_context(n)?;
            let value = decode_alternative(&mut inner)?;
            if !inner.is_empty() {
                return Err(DecodeError::TrailingData);
            }
            Ok(value)
        }
        None => decode_alternative(tags),
    }
}

fn decode_alternative<C: Choice>(tags: &mut TagList) -> Result<C, DecodeError> {
    let tag = tags.peek().ok_or(DecodeError::UnexpectedEof)?;
    let element = C::CHOICES
        .iter()
        .find(|element| selects(element, tag))
        .ok_or(DecodeError::InvalidTag)?;
    C::decode_choice(tags, element)
}

pub fn choice_is_next<C: Choice>(tags: &TagList, context: Option<u8>) -> bool {
    match (tags.peek(), context) {
        (Some(tag), Some(n)) => tag.is_opening(n),
        (Some(tag), None) => C::CHOICES.iter().any(|element| selects(element, tag)),
        (None, _) => false,
    }
}

/// Implements [`Datatype`](crate::datatype::Datatype) for a [`Choice`].
#[macro_export]
macro_rules! impl_choice_datatype {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::datatype::Datatype for $t {
                fn encode_tags(
                    &self,
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<(), $crate::EncodeError> {
                    $crate::constructed::encode_choice(self, tags, context)
                }

                fn decode_tags(
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<Self, $crate::DecodeError> {
                    $crate::constructed::decode_choice(tags, context)
                }

                fn is_next(tags: &$crate::encoding::TagList, context: Option<u8>) -> bool {
                    $crate::constructed::choice_is_next::<Self>(tags, context)
                }
            }
        )*
    };
}
