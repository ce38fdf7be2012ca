//! The encode/decode contract shared by primitive and constructed values.
//!
//! Every value flattens into a [`TagList`]. A value is written either with
//! its application tag (`context == None`) or re-tagged as a context tag
//! when it is an element of a constructed type.

use crate::encoding::{AppTag, Tag, TagList};
use crate::{DecodeError, EncodeError};

pub trait Datatype: Sized {
    fn encode_tags(&self, tags: &mut TagList, context: Option<u8>) -> Result<(), EncodeError>;

    fn decode_tags(tags: &mut TagList, context: Option<u8>) -> Result<Self, DecodeError>;

    /// Whether the front of `tags` could start a value of this type.
    fn is_next(tags: &TagList, context: Option<u8>) -> bool;
}

/// A datatype encoded as exactly one application tag.
pub trait Atomic: Sized {
    const APP_TAG: AppTag;

    fn to_tag(&self) -> Result<Tag, EncodeError>;

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError>;
}

pub fn encode_atomic<T: Atomic>(
    value: &T,
    tags: &mut TagList,
    context: Option<u8>,
) -> Result<(), EncodeError> {
    let tag = value.to_tag()?;
    match context {
        Some(n) => tags.push(tag.app_to_context(n)?),
        None => tags.push(tag),
    }
    Ok(())
}

pub fn decode_atomic<T: Atomic>(tags: &mut TagList, context: Option<u8>) -> Result<T, DecodeError> {
    let tag = tags.peek().ok_or(DecodeError::UnexpectedEof)?;
    let value = match context {
        Some(n) if tag.is_context(n) => T::from_tag(&tag.context_to_app(T::APP_TAG)?)?,
        None if tag.app_tag() == Some(T::APP_TAG) => T::from_tag(tag)?,
        _ => return Err(DecodeError::InvalidTag),
    };
    tags.pop();
    Ok(value)
}

pub fn atomic_is_next<T: Atomic>(tags: &TagList, context: Option<u8>) -> bool {
    match (tags.peek(), context) {
        (Some(tag), Some(n)) => tag.is_context(n),
        (Some(tag), None) => tag.app_tag() == Some(T::APP_TAG),
        (None, _) => false,
    }
}

/// Flattens one application-tagged value.
pub fn encode_value<T: Datatype>(value: &T) -> Result<TagList, EncodeError> {
    let mut tags = TagList::new();
    value.encode_tags(&mut tags, None)?;
    Ok(tags)
}

/// Decodes one value that must consume the whole list.
pub fn decode_value<T: Datatype>(mut tags: TagList) -> Result<T, DecodeError> {
    let value = T::decode_tags(&mut tags, None)?;
    if !tags.is_empty() {
        return Err(DecodeError::TrailingData);
    }
    Ok(value)
}

pub fn to_bytes<T: Datatype>(value: &T) -> Result<Vec<u8>, EncodeError> {
    encode_value(value)?.to_vec()
}

pub fn from_bytes<T: Datatype>(data: &[u8]) -> Result<T, DecodeError> {
    decode_value(TagList::decode(data)?)
}

#[cfg(test)]
mod tests {
    use super::{decode_value, from_bytes, to_bytes, Datatype};
    use crate::encoding::{Tag, TagList};
    use crate::types::{Boolean, Unsigned};
    use crate::DecodeError;

    #[test]
    fn context_tagging_replaces_application_tag() {
        let mut tags = TagList::new();
        Unsigned(300).encode_tags(&mut tags, Some(2)).unwrap();
        assert_eq!(tags.to_vec().unwrap(), vec![0x2A, 0x01, 0x2C]);

        assert!(Unsigned::is_next(&tags, Some(2)));
        assert!(!Unsigned::is_next(&tags, Some(1)));
        assert!(!Unsigned::is_next(&tags, None));
        assert_eq!(Unsigned::decode_tags(&mut tags, Some(2)).unwrap(), Unsigned(300));
        assert!(tags.is_empty());
    }

    #[test]
    fn wrong_tag_is_left_in_place() {
        let mut tags: TagList = [Tag::app_boolean(true)].into_iter().collect();
        assert_eq!(
            Unsigned::decode_tags(&mut tags, None).unwrap_err(),
            DecodeError::InvalidTag
        );
        assert_eq!(tags.len(), 1);
        assert_eq!(Boolean::decode_tags(&mut tags, None).unwrap(), Boolean(true));
    }

    #[test]
    fn leftovers_are_trailing_data() {
        let mut bytes = to_bytes(&Unsigned(1)).unwrap();
        bytes.extend(to_bytes(&Unsigned(2)).unwrap());
        assert_eq!(
            from_bytes::<Unsigned>(&bytes).unwrap_err(),
            DecodeError::TrailingData
        );
        assert_eq!(
            decode_value::<Unsigned>(TagList::new()).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }
}
