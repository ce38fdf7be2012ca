use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};
use std::collections::VecDeque;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectId = 12,
}

impl AppTag {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Null),
            1 => Ok(Self::Boolean),
            2 => Ok(Self::UnsignedInt),
            3 => Ok(Self::SignedInt),
            4 => Ok(Self::Real),
            5 => Ok(Self::Double),
            6 => Ok(Self::OctetString),
            7 => Ok(Self::CharacterString),
            8 => Ok(Self::BitString),
            9 => Ok(Self::Enumerated),
            10 => Ok(Self::Date),
            11 => Ok(Self::Time),
            12 => Ok(Self::ObjectId),
            _ => Err(DecodeError::InvalidTag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    Application,
    Context,
    Opening,
    Closing,
}

/// One encoded unit: class, tag number, length/value/type and payload.
///
/// For application-tagged booleans the value lives in `lvt` and `data` is
/// empty; every other non-delimiter tag has `lvt == data.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub number: u8,
    pub lvt: u32,
    pub data: Vec<u8>,
}

impl Tag {
    pub fn application(tag: AppTag, data: Vec<u8>) -> Self {
        Self {
            class: TagClass::Application,
            number: tag as u8,
            lvt: data.len() as u32,
            data,
        }
    }

    pub fn app_boolean(value: bool) -> Self {
        Self {
            class: TagClass::Application,
            number: AppTag::Boolean as u8,
            lvt: u32::from(value),
            data: Vec::new(),
        }
    }

    pub fn context(number: u8, data: Vec<u8>) -> Self {
        Self {
            class: TagClass::Context,
            number,
            lvt: data.len() as u32,
            data,
        }
    }

    pub fn opening(number: u8) -> Self {
        Self {
            class: TagClass::Opening,
            number,
            lvt: 0,
            data: Vec::new(),
        }
    }

    pub fn closing(number: u8) -> Self {
        Self {
            class: TagClass::Closing,
            number,
            lvt: 0,
            data: Vec::new(),
        }
    }

    /// The application tag, when this is an application-class tag.
    pub fn app_tag(&self) -> Option<AppTag> {
        match self.class {
            TagClass::Application => AppTag::from_u8(self.number).ok(),
            _ => None,
        }
    }

    pub fn is_context(&self, number: u8) -> bool {
        self.class == TagClass::Context && self.number == number
    }

    pub fn is_opening(&self, number: u8) -> bool {
        self.class == TagClass::Opening && self.number == number
    }

    pub fn is_closing(&self, number: u8) -> bool {
        self.class == TagClass::Closing && self.number == number
    }

    /// Re-tags an application tag as context tag `number`.
    pub fn app_to_context(&self, number: u8) -> Result<Tag, EncodeError> {
        if self.class != TagClass::Application {
            return Err(EncodeError::Message("not an application tag"));
        }
        if self.number == AppTag::Boolean as u8 {
            return Ok(Tag::context(number, vec![self.lvt as u8]));
        }
        Ok(Tag::context(number, self.data.clone()))
    }

    /// Re-tags a context tag as the given application type.
    pub fn context_to_app(&self, tag: AppTag) -> Result<Tag, DecodeError> {
        if self.class != TagClass::Context {
            return Err(DecodeError::InvalidTag);
        }
        if tag == AppTag::Boolean {
            return match self.data.as_slice() {
                [v] if *v <= 1 => Ok(Tag::app_boolean(*v == 1)),
                [_] => Err(DecodeError::InvalidValue),
                _ => Err(DecodeError::InvalidLength),
            };
        }
        Ok(Tag::application(tag, self.data.clone()))
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self.class {
            TagClass::Application => {
                encode_with_meta(w, self.number, false, self.lvt)?;
                w.write_all(&self.data)
            }
            TagClass::Context => {
                encode_with_meta(w, self.number, true, self.data.len() as u32)?;
                w.write_all(&self.data)
            }
            TagClass::Opening => encode_open_close(w, self.number, true),
            TagClass::Closing => encode_open_close(w, self.number, false),
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = r.read_u8()?;
        let class_context = (first & 0b0000_1000) != 0;

        let mut number = (first >> 4) & 0x0f;
        if number == 0x0f {
            number = r.read_u8()?;
        }

        let len_code = first & 0x07;

        if class_context && len_code == 6 {
            return Ok(Tag::opening(number));
        }
        if class_context && len_code == 7 {
            return Ok(Tag::closing(number));
        }

        if !class_context {
            let app = AppTag::from_u8(number)?;
            if app == AppTag::Boolean {
                if len_code > 1 {
                    return Err(DecodeError::InvalidValue);
                }
                return Ok(Tag::app_boolean(len_code == 1));
            }
        }

        let len = decode_len(r, len_code)?;
        let data = r.read_exact(len as usize)?.to_vec();
        Ok(Self {
            class: if class_context {
                TagClass::Context
            } else {
                TagClass::Application
            },
            number,
            lvt: len,
            data,
        })
    }
}

fn encode_with_meta(
    w: &mut Writer,
    tag_num: u8,
    is_context: bool,
    len: u32,
) -> Result<(), EncodeError> {
    let mut first: u8 = 0;

    if tag_num <= 14 {
        first |= tag_num << 4;
    } else {
        first |= 0xF0;
    }

    if is_context {
        first |= 0b0000_1000;
    }

    let len_code = if len <= 4 { len as u8 } else { 5 };

    first |= len_code;
    w.write_u8(first)?;

    if tag_num > 14 {
        w.write_u8(tag_num)?;
    }

    if len_code == 5 {
        if len <= 253 {
            w.write_u8(len as u8)?;
        } else if len <= 65535 {
            w.write_u8(254)?;
            w.write_be_u16(len as u16)?;
        } else {
            w.write_u8(255)?;
            w.write_be_u32(len)?;
        }
    }

    Ok(())
}

fn encode_open_close(w: &mut Writer, tag_num: u8, opening: bool) -> Result<(), EncodeError> {
    let mut first: u8 = 0b0000_1000;

    if tag_num <= 14 {
        first |= tag_num << 4;
    } else {
        first |= 0xF0;
    }

    first |= if opening { 6 } else { 7 };
    w.write_u8(first)?;

    if tag_num > 14 {
        w.write_u8(tag_num)?;
    }

    Ok(())
}

fn decode_len(r: &mut Reader<'_>, len_code: u8) -> Result<u32, DecodeError> {
    match len_code {
        0..=4 => Ok(len_code as u32),
        5 => {
            let v = r.read_u8()?;
            if v <= 253 {
                Ok(v as u32)
            } else if v == 254 {
                Ok(r.read_be_u16()? as u32)
            } else {
                r.read_be_u32()
            }
        }
        _ => Err(DecodeError::InvalidLength),
    }
}

/// Flattened tag stream for one value or service body.
///
/// Decoding consumes from the front; encoding appends to the back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: VecDeque<Tag>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn push(&mut self, tag: Tag) {
        self.tags.push_back(tag);
    }

    pub fn extend(&mut self, other: &TagList) {
        self.tags.extend(other.tags.iter().cloned());
    }

    pub fn peek(&self) -> Option<&Tag> {
        self.tags.front()
    }

    pub fn pop(&mut self) -> Option<Tag> {
        self.tags.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// Removes the group wrapped in opening/closing tag `number` from the
    /// front of the list and returns its contents without the delimiters.
    pub fn get_context(&mut self, number: u8) -> Result<TagList, DecodeError> {
        match self.tags.front() {
            Some(tag) if tag.is_opening(number) => {}
            Some(_) => return Err(DecodeError::InvalidTag),
            None => return Err(DecodeError::UnexpectedEof),
        }
        self.tags.pop_front();

        let mut inner = TagList::new();
        let mut depth = 0usize;
        loop {
            let tag = self.tags.pop_front().ok_or(DecodeError::UnbalancedTags)?;
            match tag.class {
                TagClass::Opening => depth += 1,
                TagClass::Closing if depth == 0 => {
                    if tag.number != number {
                        return Err(DecodeError::UnbalancedTags);
                    }
                    return Ok(inner);
                }
                TagClass::Closing => depth -= 1,
                _ => {}
            }
            inner.push(tag);
        }
    }

    /// Removes tags from the front up to, not including, the first closing
    /// tag that has no opening partner inside the taken range.
    pub fn take_until_close(&mut self) -> TagList {
        let mut taken = TagList::new();
        let mut depth = 0usize;
        while let Some(tag) = self.tags.front() {
            match tag.class {
                TagClass::Closing if depth == 0 => break,
                TagClass::Closing => depth -= 1,
                TagClass::Opening => depth += 1,
                _ => {}
            }
            if let Some(tag) = self.tags.pop_front() {
                taken.push(tag);
            }
        }
        taken
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        for tag in &self.tags {
            tag.encode(w)?;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }

    /// Decodes every tag in `data`, checking that delimiters nest.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let mut list = TagList::new();
        let mut open: Vec<u8> = Vec::new();
        while !r.is_empty() {
            let tag = Tag::decode(&mut r)?;
            match tag.class {
                TagClass::Opening => open.push(tag.number),
                TagClass::Closing => {
                    if open.pop() != Some(tag.number) {
                        return Err(DecodeError::UnbalancedTags);
                    }
                }
                _ => {}
            }
            list.push(tag);
        }
        if !open.is_empty() {
            return Err(DecodeError::UnbalancedTags);
        }
        Ok(list)
    }
}

impl FromIterator<Tag> for TagList {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TagList {
    type Item = Tag;
    type IntoIter = std::collections::vec_deque::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{AppTag, Tag, TagClass, TagList};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::DecodeError;
    use proptest::prelude::*;

    fn encoded(tag: &Tag) -> Vec<u8> {
        let mut w = Writer::new();
        tag.encode(&mut w).unwrap();
        w.into_inner()
    }

    #[test]
    fn four_octets_stay_inline_five_extend() {
        let four = encoded(&Tag::application(AppTag::OctetString, vec![0; 4]));
        assert_eq!(four[0], 0x64);
        assert_eq!(four.len(), 1 + 4);

        let five = encoded(&Tag::application(AppTag::OctetString, vec![0; 5]));
        assert_eq!(&five[..2], &[0x65, 5]);
        assert_eq!(five.len(), 2 + 5);
    }

    #[test]
    fn extended_length_thresholds() {
        let l253 = encoded(&Tag::application(AppTag::OctetString, vec![0; 253]));
        assert_eq!(&l253[..2], &[0x65, 253]);

        let l254 = encoded(&Tag::application(AppTag::OctetString, vec![0; 254]));
        assert_eq!(&l254[..4], &[0x65, 254, 0x00, 0xFE]);

        let l65535 = encoded(&Tag::application(AppTag::OctetString, vec![0; 65535]));
        assert_eq!(&l65535[..4], &[0x65, 254, 0xFF, 0xFF]);

        let l65536 = encoded(&Tag::application(AppTag::OctetString, vec![0; 65536]));
        assert_eq!(&l65536[..6], &[0x65, 255, 0x00, 0x01, 0x00, 0x00]);

        for (bytes, len) in [(l253, 253), (l254, 254), (l65535, 65535), (l65536, 65536)] {
            let mut r = Reader::new(&bytes);
            let tag = Tag::decode(&mut r).unwrap();
            assert_eq!(tag.lvt, len);
            assert_eq!(tag.data.len(), len as usize);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn large_context_number_uses_extra_octet() {
        let bytes = encoded(&Tag::context(30, vec![1, 2]));
        assert_eq!(bytes, vec![0xFA, 30, 1, 2]);
        let tag = Tag::decode(&mut Reader::new(&bytes)).unwrap();
        assert!(tag.is_context(30));

        let bytes = encoded(&Tag::opening(20));
        assert_eq!(bytes, vec![0xFE, 20]);
    }

    #[test]
    fn application_boolean_keeps_value_in_lvt() {
        assert_eq!(encoded(&Tag::app_boolean(true)), vec![0x11]);
        let tag = Tag::decode(&mut Reader::new(&[0x10])).unwrap();
        assert_eq!(tag, Tag::app_boolean(false));

        let ctx = Tag::app_boolean(true).app_to_context(2).unwrap();
        assert_eq!(ctx.data, vec![1]);
        assert_eq!(
            ctx.context_to_app(AppTag::Boolean).unwrap(),
            Tag::app_boolean(true)
        );
    }

    #[test]
    fn reserved_application_numbers_are_rejected() {
        assert_eq!(
            Tag::decode(&mut Reader::new(&[0xD0])).unwrap_err(),
            DecodeError::InvalidTag
        );
    }

    #[test]
    fn get_context_extracts_nested_group() {
        let list: TagList = [
            Tag::opening(3),
            Tag::opening(0),
            Tag::context(1, vec![7]),
            Tag::closing(0),
            Tag::application(AppTag::UnsignedInt, vec![9]),
            Tag::closing(3),
            Tag::context(4, vec![1]),
        ]
        .into_iter()
        .collect();
        let mut list = list;

        let inner = list.get_context(3).unwrap();
        assert_eq!(inner.len(), 4);
        assert_eq!(inner.peek().map(|t| t.class), Some(TagClass::Opening));
        assert_eq!(list.len(), 1);
        assert!(list.peek().unwrap().is_context(4));
    }

    #[test]
    fn decode_rejects_unbalanced_delimiters() {
        // opening 1, closing 2
        assert_eq!(
            TagList::decode(&[0x1E, 0x2F]).unwrap_err(),
            DecodeError::UnbalancedTags
        );
        // opening 1 never closed
        assert_eq!(
            TagList::decode(&[0x1E, 0x21, 0x05]).unwrap_err(),
            DecodeError::UnbalancedTags
        );
    }

    proptest! {
        #[test]
        fn context_tag_length_survives(len in 0usize..70_000, number in 0u8..=253) {
            let tag = Tag::context(number, vec![0xA5; len]);
            let bytes = encoded(&tag);
            let mut r = Reader::new(&bytes);
            let decoded = Tag::decode(&mut r).unwrap();
            prop_assert!(r.is_empty());
            prop_assert_eq!(decoded, tag);
        }
    }
}
