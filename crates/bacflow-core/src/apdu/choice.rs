bacnet_enum! {
    /// Service choice of a confirmed request.
    pub enum ConfirmedServiceChoice: u8, Unknown {
        AcknowledgeAlarm = 0 => "acknowledge-alarm",
        ConfirmedCovNotification = 1 => "confirmed-cov-notification",
        ConfirmedEventNotification = 2 => "confirmed-event-notification",
        GetAlarmSummary = 3 => "get-alarm-summary",
        GetEnrollmentSummary = 4 => "get-enrollment-summary",
        SubscribeCov = 5 => "subscribe-cov",
        AtomicReadFile = 6 => "atomic-read-file",
        AtomicWriteFile = 7 => "atomic-write-file",
        AddListElement = 8 => "add-list-element",
        RemoveListElement = 9 => "remove-list-element",
        CreateObject = 10 => "create-object",
        DeleteObject = 11 => "delete-object",
        ReadProperty = 12 => "read-property",
        ReadPropertyMultiple = 14 => "read-property-multiple",
        WriteProperty = 15 => "write-property",
        WritePropertyMultiple = 16 => "write-property-multiple",
        DeviceCommunicationControl = 17 => "device-communication-control",
        ConfirmedPrivateTransfer = 18 => "confirmed-private-transfer",
        ConfirmedTextMessage = 19 => "confirmed-text-message",
        ReinitializeDevice = 20 => "reinitialize-device",
        ReadRange = 26 => "read-range",
        SubscribeCovProperty = 28 => "subscribe-cov-property",
        GetEventInformation = 29 => "get-event-information",
    }
}

bacnet_enum! {
    /// Service choice of an unconfirmed request.
    pub enum UnconfirmedServiceChoice: u8, Unknown {
        IAm = 0 => "i-am",
        IHave = 1 => "i-have",
        UnconfirmedCovNotification = 2 => "unconfirmed-cov-notification",
        UnconfirmedEventNotification = 3 => "unconfirmed-event-notification",
        UnconfirmedPrivateTransfer = 4 => "unconfirmed-private-transfer",
        UnconfirmedTextMessage = 5 => "unconfirmed-text-message",
        TimeSynchronization = 6 => "time-synchronization",
        WhoHas = 7 => "who-has",
        WhoIs = 8 => "who-is",
        UtcTimeSynchronization = 9 => "utc-time-synchronization",
        WriteGroup = 10 => "write-group",
    }
}
