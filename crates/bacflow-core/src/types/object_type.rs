bacnet_enum! {
    /// BACnet object types.
    ///
    /// Vendor-specific types (128 and up) land in [`Proprietary`](Self::Proprietary).
    pub enum ObjectType: u16, Proprietary {
        AnalogInput = 0 => "analog-input",
        AnalogOutput = 1 => "analog-output",
        AnalogValue = 2 => "analog-value",
        BinaryInput = 3 => "binary-input",
        BinaryOutput = 4 => "binary-output",
        BinaryValue = 5 => "binary-value",
        Calendar = 6 => "calendar",
        Command = 7 => "command",
        Device = 8 => "device",
        EventEnrollment = 9 => "event-enrollment",
        File = 10 => "file",
        Group = 11 => "group",
        Loop = 12 => "loop",
        MultiStateInput = 13 => "multi-state-input",
        MultiStateOutput = 14 => "multi-state-output",
        NotificationClass = 15 => "notification-class",
        Program = 16 => "program",
        Schedule = 17 => "schedule",
        Averaging = 18 => "averaging",
        MultiStateValue = 19 => "multi-state-value",
        TrendLog = 20 => "trend-log",
        LifeSafetyPoint = 21 => "life-safety-point",
        LifeSafetyZone = 22 => "life-safety-zone",
        Accumulator = 23 => "accumulator",
        PulseConverter = 24 => "pulse-converter",
        EventLog = 25 => "event-log",
        GlobalGroup = 26 => "global-group",
        TrendLogMultiple = 27 => "trend-log-multiple",
        LoadControl = 28 => "load-control",
        StructuredView = 29 => "structured-view",
        AccessDoor = 30 => "access-door",
        CharacterStringValue = 40 => "characterstring-value",
        IntegerValue = 45 => "integer-value",
        NetworkPort = 56 => "network-port",
    }
}

enumerated_datatype!(
    ObjectType,
    |raw| u16::try_from(raw)
        .map(ObjectType::from_raw)
        .map_err(|_| crate::DecodeError::InvalidValue),
    |this| u32::from(this.to_raw())
);

#[cfg(test)]
mod tests {
    use super::ObjectType;

    #[test]
    fn names_and_numbers_agree() {
        assert_eq!(ObjectType::from_raw(8), ObjectType::Device);
        assert_eq!(ObjectType::NetworkPort.to_raw(), 56);
        assert_eq!("analog-value".parse::<ObjectType>().unwrap(), ObjectType::AnalogValue);
        assert_eq!("600".parse::<ObjectType>().unwrap(), ObjectType::Proprietary(600));
        assert_eq!(ObjectType::Proprietary(600).to_string(), "600");
        assert_eq!(ObjectType::BinaryOutput.to_string(), "binary-output");
    }
}
