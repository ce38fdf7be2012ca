/// Declares an extensible BACnet enumeration.
///
/// Every known value gets a named variant plus a hyphenated display name;
/// values outside the table are preserved in the trailing catch-all variant
/// so decode/encode never loses information.
macro_rules! bacnet_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty, $other:ident {
            $($variant:ident = $value:literal => $text:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis enum $name {
            $($variant,)*
            $other($repr),
        }

        impl $name {
            pub const fn to_raw(self) -> $repr {
                match self {
                    $(Self::$variant => $value,)*
                    Self::$other(v) => v,
                }
            }

            pub const fn from_raw(value: $repr) -> Self {
                match value {
                    $($value => Self::$variant,)*
                    v => Self::$other(v),
                }
            }

            /// Hyphenated BACnet name, `None` for values outside the table.
            pub const fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($text),)*
                    Self::$other(_) => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self.name() {
                    Some(text) => f.write_str(text),
                    None => write!(f, "{}", self.to_raw()),
                }
            }
        }

        impl core::str::FromStr for $name {
            type Err = $crate::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)*
                    other => other
                        .parse::<$repr>()
                        .map(Self::from_raw)
                        .map_err(|_| $crate::DecodeError::InvalidValue),
                }
            }
        }
    };
}

/// Implements [`Datatype`](crate::datatype::Datatype) for types that are a
/// single application or context tag.
macro_rules! impl_atomic_datatype {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::datatype::Datatype for $t {
                fn encode_tags(
                    &self,
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<(), $crate::EncodeError> {
                    $crate::datatype::encode_atomic(self, tags, context)
                }

                fn decode_tags(
                    tags: &mut $crate::encoding::TagList,
                    context: Option<u8>,
                ) -> Result<Self, $crate::DecodeError> {
                    $crate::datatype::decode_atomic(tags, context)
                }

                fn is_next(tags: &$crate::encoding::TagList, context: Option<u8>) -> bool {
                    $crate::datatype::atomic_is_next::<Self>(tags, context)
                }
            }
        )*
    };
}

/// Makes an enumeration a BACnet `Enumerated` datatype.
macro_rules! enumerated_datatype {
    ($t:ty, |$raw:ident| $from:expr, |$this:ident| $to:expr) => {
        impl $crate::datatype::Atomic for $t {
            const APP_TAG: $crate::encoding::AppTag = $crate::encoding::AppTag::Enumerated;

            fn to_tag(&self) -> Result<$crate::encoding::Tag, $crate::EncodeError> {
                let $this = *self;
                Ok($crate::encoding::Tag::application(
                    $crate::encoding::AppTag::Enumerated,
                    $crate::encoding::primitives::unsigned_octets($to),
                ))
            }

            fn from_tag(tag: &$crate::encoding::Tag) -> Result<Self, $crate::DecodeError> {
                let $raw = $crate::encoding::primitives::unsigned_from_octets(&tag.data)?;
                $from
            }
        }

        impl_atomic_datatype!($t);
    };
}
