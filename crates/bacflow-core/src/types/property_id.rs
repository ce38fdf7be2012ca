bacnet_enum! {
    /// BACnet property identifiers.
    pub enum PropertyId: u32, Proprietary {
        ApduSegmentTimeout = 10 => "apdu-segment-timeout",
        ApduTimeout = 11 => "apdu-timeout",
        ApplicationSoftwareVersion = 12 => "application-software-version",
        DeviceAddressBinding = 30 => "device-address-binding",
        Description = 28 => "description",
        FirmwareRevision = 44 => "firmware-revision",
        MaxApduLengthAccepted = 62 => "max-apdu-length-accepted",
        ModelName = 70 => "model-name",
        NumberOfApduRetries = 73 => "number-of-apdu-retries",
        ObjectIdentifier = 75 => "object-identifier",
        ObjectList = 76 => "object-list",
        ObjectName = 77 => "object-name",
        ObjectType = 79 => "object-type",
        OutOfService = 81 => "out-of-service",
        PresentValue = 85 => "present-value",
        PriorityArray = 87 => "priority-array",
        ProtocolObjectTypesSupported = 96 => "protocol-object-types-supported",
        ProtocolServicesSupported = 97 => "protocol-services-supported",
        ProtocolVersion = 98 => "protocol-version",
        RelinquishDefault = 104 => "relinquish-default",
        SegmentationSupported = 107 => "segmentation-supported",
        StatusFlags = 111 => "status-flags",
        SystemStatus = 112 => "system-status",
        Units = 117 => "units",
        VendorIdentifier = 120 => "vendor-identifier",
        VendorName = 121 => "vendor-name",
        ProtocolRevision = 139 => "protocol-revision",
        DatabaseRevision = 155 => "database-revision",
        MaxSegmentsAccepted = 167 => "max-segments-accepted",
        PropertyList = 371 => "property-list",
    }
}

enumerated_datatype!(PropertyId, |raw| Ok(PropertyId::from_raw(raw)), |this| this.to_raw());

#[cfg(test)]
mod tests {
    use super::PropertyId;
    use crate::datatype::{from_bytes, to_bytes};

    #[test]
    fn proprietary_identifiers_are_preserved() {
        let id = PropertyId::from_raw(5123);
        assert_eq!(id, PropertyId::Proprietary(5123));
        let bytes = to_bytes(&id).unwrap();
        assert_eq!(bytes, vec![0x92, 0x14, 0x03]);
        assert_eq!(from_bytes::<PropertyId>(&bytes).unwrap(), id);
        assert_eq!(
            from_bytes::<PropertyId>(&[0x91, 85]).unwrap(),
            PropertyId::PresentValue
        );
    }
}
