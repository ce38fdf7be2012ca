pub mod date_time;
pub mod enums;
pub mod object_id;
pub mod object_type;
pub mod primitive;
pub mod property_id;

pub use date_time::{Date, Time};
pub use enums::{ErrorClass, ErrorCode, MaxApdu, MaxSegments, Segmentation};
pub use object_id::ObjectId;
pub use object_type::ObjectType;
pub use primitive::{
    BitString, Boolean, CharacterString, Double, Enumerated, Integer, Null, OctetString, Real,
    Unsigned,
};
pub use property_id::PropertyId;
