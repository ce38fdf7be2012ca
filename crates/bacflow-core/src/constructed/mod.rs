//! Sequences, choices, arrays and lists built from ordered tag streams.

pub mod any;
pub mod array;
pub mod choice;
pub mod sequence;

pub use any::Any;
pub use array::{ArrayElement, ArrayOf, ListOf, SequenceOf};
pub use choice::{choice_is_next, decode_choice, encode_choice, Choice};
pub use sequence::{
    decode_sequence, encode_sequence, sequence_is_next, Element, Sequence, SequenceDecoder,
    SequenceEncoder,
};
