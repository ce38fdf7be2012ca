bacnet_enum! {
    /// Reason carried in an Abort PDU.
    pub enum AbortReason: u8, Other {
        Unspecified = 0 => "other",
        BufferOverflow = 1 => "buffer-overflow",
        InvalidApduInThisState = 2 => "invalid-apdu-in-this-state",
        PreemptedByHigherPriorityTask = 3 => "preempted-by-higher-priority-task",
        SegmentationNotSupported = 4 => "segmentation-not-supported",
        SecurityError = 5 => "security-error",
        InsufficientSecurity = 6 => "insufficient-security",
        WindowSizeOutOfRange = 7 => "window-size-out-of-range",
        ApplicationExceededReplyTime = 8 => "application-exceeded-reply-time",
        OutOfResources = 9 => "out-of-resources",
        TsmTimeout = 10 => "tsm-timeout",
        ApduTooLong = 11 => "apdu-too-long",
    }
}

bacnet_enum! {
    /// Reason carried in a Reject PDU.
    pub enum RejectReason: u8, Other {
        Unspecified = 0 => "other",
        BufferOverflow = 1 => "buffer-overflow",
        InconsistentParameters = 2 => "inconsistent-parameters",
        InvalidParameterDataType = 3 => "invalid-parameter-data-type",
        InvalidTag = 4 => "invalid-tag",
        MissingRequiredParameter = 5 => "missing-required-parameter",
        ParameterOutOfRange = 6 => "parameter-out-of-range",
        TooManyArguments = 7 => "too-many-arguments",
        UndefinedEnumeration = 8 => "undefined-enumeration",
        UnrecognizedService = 9 => "unrecognized-service",
    }
}

impl RejectReason {
    /// The reject sent back for a request body that failed to decode.
    pub fn for_decode_error(err: crate::DecodeError) -> Self {
        use crate::DecodeError;
        match err {
            DecodeError::MissingRequiredElement(_) => Self::MissingRequiredParameter,
            DecodeError::InvalidTag | DecodeError::UnbalancedTags => Self::InvalidTag,
            DecodeError::TrailingData => Self::TooManyArguments,
            DecodeError::InvalidValue => Self::ParameterOutOfRange,
            DecodeError::UnexpectedEof | DecodeError::InvalidLength => Self::InvalidParameterDataType,
            _ => Self::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AbortReason, RejectReason};
    use crate::DecodeError;

    #[test]
    fn reason_numbers() {
        assert_eq!(AbortReason::TsmTimeout.to_raw(), 10);
        assert_eq!(AbortReason::from_raw(200), AbortReason::Other(200));
        assert_eq!(RejectReason::UnrecognizedService.to_raw(), 9);
        assert_eq!(
            RejectReason::for_decode_error(DecodeError::MissingRequiredElement("x")),
            RejectReason::MissingRequiredParameter
        );
    }
}
