/// Minimal-octet integer helpers shared by the primitive datatypes.
pub mod primitives;
/// Cursor for decoding received frames.
pub mod reader;
/// Tag codec and the flattened tag list.
pub mod tag;
/// Growable byte writer with an optional size ceiling.
pub mod writer;

pub use reader::Reader;
pub use tag::{AppTag, Tag, TagClass, TagList};
pub use writer::Writer;
