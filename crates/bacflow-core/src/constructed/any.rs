use crate::datatype::{decode_value, Datatype};
use crate::encoding::{Tag, TagList};
use crate::{DecodeError, EncodeError};

/// Type-erased captured value.
///
/// Services that carry "any datatype" (ReadProperty, WriteProperty) hold the
/// raw tags here; callers `cast_out` once they know the concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Any {
    tags: TagList,
}

impl Any {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tags(tags: TagList) -> Self {
        Self { tags }
    }

    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Captures `value` in its application-tagged form.
    pub fn cast_in<T: Datatype>(value: &T) -> Result<Self, EncodeError> {
        let mut tags = TagList::new();
        value.encode_tags(&mut tags, None)?;
        Ok(Self { tags })
    }

    /// Interprets the captured tags as `T`; leftover tags are an error.
    pub fn cast_out<T: Datatype>(&self) -> Result<T, DecodeError> {
        decode_value(self.tags.clone())
    }
}

impl Datatype for Any {
    fn encode_tags(&self, tags: &mut TagList, context: Option<u8>) -> Result<(), EncodeError> {
        if let Some(n) = context {
            tags.push(Tag::opening(n));
        }
        tags.extend(&self.tags);
        if let Some(n) = context {
            tags.push(Tag::closing(n));
        }
        Ok(())
    }

    fn decode_tags(tags: &mut TagList, context: Option<u8>) -> Result<Self, DecodeError> {
        let captured = match context {
            Some(n) => tags.get_context(n)?,
            None => tags.take_until_close(),
        };
        Ok(Self { tags: captured })
    }

    fn is_next(tags: &TagList, context: Option<u8>) -> bool {
        match context {
            Some(n) => tags.peek().is_some_and(|tag| tag.is_opening(n)),
            None => true,
        }
    }
}
