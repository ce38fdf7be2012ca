use crate::datatype::Datatype;
use crate::encoding::{Tag, TagClass, TagList};
use crate::types::Unsigned;
use crate::{DecodeError, EncodeError};

/// BACnet array: 1-based element access, index 0 is the length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayOf<T> {
    items: Vec<T>,
}

/// Result of indexing an [`ArrayOf`].
#[derive(Debug, PartialEq)]
pub enum ArrayElement<'a, T> {
    Length(Unsigned),
    Element(&'a T),
}

impl<T> ArrayOf<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn get(&self, index: u32) -> Result<ArrayElement<'_, T>, DecodeError> {
        if index == 0 {
            let len = u32::try_from(self.items.len()).map_err(|_| DecodeError::InvalidValue)?;
            return Ok(ArrayElement::Length(Unsigned(len)));
        }
        self.items
            .get(index as usize - 1)
            .map(ArrayElement::Element)
            .ok_or(DecodeError::InvalidArrayIndex)
    }

    /// Replaces element `index` (1-based). Index 0 is the length and is not writable here.
    pub fn set(&mut self, index: u32, value: T) -> Result<(), DecodeError> {
        if index == 0 {
            return Err(DecodeError::InvalidArrayIndex);
        }
        let slot = self
            .items
            .get_mut(index as usize - 1)
            .ok_or(DecodeError::InvalidArrayIndex)?;
        *slot = value;
        Ok(())
    }
}

impl<T> FromIterator<T> for ArrayOf<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Ordered collection without array indexing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceOf<T> {
    pub items: Vec<T>,
}

pub type ListOf<T> = SequenceOf<T>;

impl<T> SequenceOf<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

fn encode_items<T: Datatype>(
    items: &[T],
    tags: &mut TagList,
    context: Option<u8>,
) -> Result<(), EncodeError> {
    if let Some(n) = context {
        tags.push(Tag::opening(n));
    }
    for item in items {
        item.encode_tags(tags, None)?;
    }
    if let Some(n) = context {
        tags.push(Tag::closing(n));
    }
    Ok(())
}

/// Reads items until the list is exhausted or an enclosing closing tag shows up.
fn decode_items<T: Datatype>(tags: &mut TagList, context: Option<u8>) -> Result<Vec<T>, DecodeError> {
    let mut scoped;
    let source = match context {
        Some(n) => {
            scoped = tags.get_context(n)?;
            &mut scoped
        }
        None => tags,
    };
    let mut items = Vec::new();
    while let Some(tag) = source.peek() {
        if tag.class == TagClass::Closing {
            break;
        }
        items.push(T::decode_tags(source, None)?);
    }
    Ok(items)
}

fn collection_is_next(tags: &TagList, context: Option<u8>) -> bool {
    match context {
        Some(n) => tags.peek().is_some_and(|tag| tag.is_opening(n)),
        None => true,
    }
}

impl<T: Datatype> Datatype for ArrayOf<T> {
    fn encode_tags(&self, tags: &mut TagList, context: Option<u8>) -> Result<(), EncodeError> {
        encode_items(&self.items, tags, context)
    }

    fn decode_tags(tags: &mut TagList, context: Option<u8>) -> Result<Self, DecodeError> {
        decode_items(tags, context).map(Self::new)
    }

    fn is_next(tags: &TagList, context: Option<u8>) -> bool {
        collection_is_next(tags, context)
    }
}

impl<T: Datatype> Datatype for SequenceOf<T> {
    fn encode_tags(&self, tags: &mut TagList, context: Option<u8>) -> Result<(), EncodeError> {
        encode_items(&self.items, tags, context)
    }

    fn decode_tags(tags: &mut TagList, context: Option<u8>) -> Result<Self, DecodeError> {
        decode_items(tags, context).map(Self::new)
    }

    fn is_next(tags: &TagList, context: Option<u8>) -> bool {
        collection_is_next(tags, context)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArrayElement, ArrayOf, SequenceOf};
    use crate::datatype::{decode_value, encode_value, Datatype};
    use crate::encoding::{Tag, TagList};
    use crate::types::{ObjectId, ObjectType, Unsigned};
    use crate::DecodeError;

    #[test]
    fn index_zero_is_length() {
        let array: ArrayOf<Unsigned> = [10, 20, 30].into_iter().map(Unsigned).collect();
        assert_eq!(array.get(0).unwrap(), ArrayElement::Length(Unsigned(3)));
        assert_eq!(array.get(1).unwrap(), ArrayElement::Element(&Unsigned(10)));
        assert_eq!(array.get(3).unwrap(), ArrayElement::Element(&Unsigned(30)));
        assert_eq!(array.get(4).unwrap_err(), DecodeError::InvalidArrayIndex);
    }

    #[test]
    fn set_respects_bounds() {
        let mut array = ArrayOf::new(vec![Unsigned(1)]);
        array.set(1, Unsigned(5)).unwrap();
        assert_eq!(array.items(), &[Unsigned(5)]);
        assert_eq!(array.set(0, Unsigned(9)).unwrap_err(), DecodeError::InvalidArrayIndex);
        assert_eq!(array.set(2, Unsigned(9)).unwrap_err(), DecodeError::InvalidArrayIndex);
    }

    #[test]
    fn context_wrapped_items_stop_at_closing_tag() {
        let list = SequenceOf::new(vec![
            ObjectId::new(ObjectType::Device, 1),
            ObjectId::new(ObjectType::AnalogInput, 2),
        ]);
        let mut tags = TagList::new();
        list.encode_tags(&mut tags, Some(3)).unwrap();
        tags.push(Tag::context(4, vec![1]));

        let decoded = SequenceOf::<ObjectId>::decode_tags(&mut tags, Some(3)).unwrap();
        assert_eq!(decoded, list);
        assert!(tags.peek().unwrap().is_context(4));
    }

    #[test]
    fn bare_array_consumes_whole_list() {
        let array = ArrayOf::new(vec![Unsigned(1), Unsigned(2)]);
        let tags = encode_value(&array).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(decode_value::<ArrayOf<Unsigned>>(tags).unwrap(), array);
    }
}
