use crate::DecodeError;

bacnet_enum! {
    /// Error class carried in Error PDUs.
    pub enum ErrorClass: u32, Proprietary {
        Device = 0 => "device",
        Object = 1 => "object",
        Property = 2 => "property",
        Resources = 3 => "resources",
        Security = 4 => "security",
        Services = 5 => "services",
        Vt = 6 => "vt",
        Communication = 7 => "communication",
    }
}

bacnet_enum! {
    /// Error code carried in Error PDUs.
    pub enum ErrorCode: u32, Proprietary {
        Other = 0 => "other",
        ConfigurationInProgress = 2 => "configuration-in-progress",
        DeviceBusy = 3 => "device-busy",
        DynamicCreationNotSupported = 4 => "dynamic-creation-not-supported",
        FileAccessDenied = 5 => "file-access-denied",
        InconsistentParameters = 7 => "inconsistent-parameters",
        InvalidDataType = 9 => "invalid-data-type",
        MissingRequiredParameter = 16 => "missing-required-parameter",
        NoSpaceForObject = 18 => "no-space-for-object",
        NotCosProperty = 24 => "not-cos-property",
        ObjectDeletionNotPermitted = 23 => "object-deletion-not-permitted",
        OperationalProblem = 25 => "operational-problem",
        PasswordFailure = 26 => "password-failure",
        ReadAccessDenied = 27 => "read-access-denied",
        ServiceRequestDenied = 29 => "service-request-denied",
        Timeout = 30 => "timeout",
        UnknownObject = 31 => "unknown-object",
        UnknownProperty = 32 => "unknown-property",
        UnsupportedObjectType = 36 => "unsupported-object-type",
        ValueOutOfRange = 37 => "value-out-of-range",
        WriteAccessDenied = 40 => "write-access-denied",
        InvalidArrayIndex = 42 => "invalid-array-index",
        PropertyIsNotAList = 22 => "property-is-not-a-list",
        NoObjectsOfSpecifiedType = 17 => "no-objects-of-specified-type",
        PropertyIsNotAnArray = 50 => "property-is-not-an-array",
        AbortTsmTimeout = 123 => "abort-tsm-timeout",
    }
}

enumerated_datatype!(ErrorClass, |raw| Ok(ErrorClass::from_raw(raw)), |this| this.to_raw());
enumerated_datatype!(ErrorCode, |raw| Ok(ErrorCode::from_raw(raw)), |this| this.to_raw());

/// Segmentation capability advertised in I-Am and device objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Segmentation {
    SegmentedBoth = 0,
    SegmentedTransmit = 1,
    SegmentedReceive = 2,
    #[default]
    NoSegmentation = 3,
}

impl Segmentation {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::SegmentedBoth),
            1 => Some(Self::SegmentedTransmit),
            2 => Some(Self::SegmentedReceive),
            3 => Some(Self::NoSegmentation),
            _ => None,
        }
    }

    pub const fn can_transmit(self) -> bool {
        matches!(self, Self::SegmentedBoth | Self::SegmentedTransmit)
    }

    pub const fn can_receive(self) -> bool {
        matches!(self, Self::SegmentedBoth | Self::SegmentedReceive)
    }
}

enumerated_datatype!(
    Segmentation,
    |raw| Segmentation::from_u32(raw).ok_or(DecodeError::InvalidValue),
    |this| this.to_u32()
);

/// Max-APDU-length-accepted code from a confirmed request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MaxApdu {
    UpTo50 = 0,
    UpTo128 = 1,
    UpTo206 = 2,
    UpTo480 = 3,
    UpTo1024 = 4,
    UpTo1476 = 5,
}

impl MaxApdu {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::UpTo50),
            1 => Some(Self::UpTo128),
            2 => Some(Self::UpTo206),
            3 => Some(Self::UpTo480),
            4 => Some(Self::UpTo1024),
            5 => Some(Self::UpTo1476),
            _ => None,
        }
    }

    pub const fn octets(self) -> usize {
        match self {
            Self::UpTo50 => 50,
            Self::UpTo128 => 128,
            Self::UpTo206 => 206,
            Self::UpTo480 => 480,
            Self::UpTo1024 => 1024,
            Self::UpTo1476 => 1476,
        }
    }

    /// Largest code whose length does not exceed `octets`.
    pub const fn from_octets(octets: usize) -> Self {
        if octets >= 1476 {
            Self::UpTo1476
        } else if octets >= 1024 {
            Self::UpTo1024
        } else if octets >= 480 {
            Self::UpTo480
        } else if octets >= 206 {
            Self::UpTo206
        } else if octets >= 128 {
            Self::UpTo128
        } else {
            Self::UpTo50
        }
    }
}

/// Max-segments-accepted code from a confirmed request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MaxSegments {
    Unspecified = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
    Sixteen = 4,
    ThirtyTwo = 5,
    SixtyFour = 6,
    MoreThanSixtyFour = 7,
}

impl MaxSegments {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 0x07 {
            1 => Self::Two,
            2 => Self::Four,
            3 => Self::Eight,
            4 => Self::Sixteen,
            5 => Self::ThirtyTwo,
            6 => Self::SixtyFour,
            7 => Self::MoreThanSixtyFour,
            _ => Self::Unspecified,
        }
    }

    /// Segment count limit; `None` when the peer did not state one.
    pub const fn count(self) -> Option<usize> {
        match self {
            Self::Unspecified | Self::MoreThanSixtyFour => None,
            Self::Two => Some(2),
            Self::Four => Some(4),
            Self::Eight => Some(8),
            Self::Sixteen => Some(16),
            Self::ThirtyTwo => Some(32),
            Self::SixtyFour => Some(64),
        }
    }

    /// Smallest code that allows `count` segments.
    pub const fn from_count(count: usize) -> Self {
        if count <= 2 {
            Self::Two
        } else if count <= 4 {
            Self::Four
        } else if count <= 8 {
            Self::Eight
        } else if count <= 16 {
            Self::Sixteen
        } else if count <= 32 {
            Self::ThirtyTwo
        } else if count <= 64 {
            Self::SixtyFour
        } else {
            Self::MoreThanSixtyFour
        }
    }
}
