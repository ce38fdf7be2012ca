//! Plain-data configuration handed to the layer constructors.

use bacflow_core::types::{MaxApdu, MaxSegments, Segmentation};
use bacflow_datalink::BdtEntry;
use std::net::SocketAddrV4;
use std::time::Duration;

/// Segmentation and timing parameters of the state machine access point.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmapConfig {
    pub max_apdu_length_accepted: MaxApdu,
    pub segmentation_supported: Segmentation,
    pub max_segments_accepted: MaxSegments,
    pub proposed_window_size: u8,
    pub apdu_timeout: Duration,
    pub segment_timeout: Duration,
    pub number_of_apdu_retries: u8,
    /// How long a server transaction waits for the application to answer.
    pub application_timeout: Duration,
}

impl Default for SmapConfig {
    fn default() -> Self {
        Self {
            max_apdu_length_accepted: MaxApdu::UpTo1476,
            segmentation_supported: Segmentation::SegmentedBoth,
            max_segments_accepted: MaxSegments::SixtyFour,
            proposed_window_size: 2,
            apdu_timeout: Duration::from_secs(3),
            segment_timeout: Duration::from_millis(1500),
            number_of_apdu_retries: 3,
            application_timeout: Duration::from_secs(3),
        }
    }
}

impl SmapConfig {
    pub fn with_max_apdu(mut self, max_apdu: MaxApdu) -> Self {
        self.max_apdu_length_accepted = max_apdu;
        self
    }

    pub fn with_segmentation(mut self, segmentation: Segmentation) -> Self {
        self.segmentation_supported = segmentation;
        self
    }

    pub fn with_max_segments(mut self, max_segments: MaxSegments) -> Self {
        self.max_segments_accepted = max_segments;
        self
    }

    pub fn with_window_size(mut self, window: u8) -> Self {
        self.proposed_window_size = window.clamp(1, 127);
        self
    }

    pub fn with_apdu_timeout(mut self, timeout: Duration) -> Self {
        self.apdu_timeout = timeout;
        self
    }

    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.segment_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.number_of_apdu_retries = retries;
        self
    }

    pub fn with_application_timeout(mut self, timeout: Duration) -> Self {
        self.application_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NsapConfig {
    /// How long NPDUs wait for an I-Am-Router-To-Network.
    pub router_discovery_wait: Duration,
    /// NPDUs held per unknown network; the oldest is dropped beyond this.
    pub pending_queue_limit: usize,
}

impl Default for NsapConfig {
    fn default() -> Self {
        Self {
            router_discovery_wait: Duration::from_secs(10),
            pending_queue_limit: 16,
        }
    }
}

impl NsapConfig {
    pub fn with_router_discovery_wait(mut self, wait: Duration) -> Self {
        self.router_discovery_wait = wait;
        self
    }

    pub fn with_pending_queue_limit(mut self, limit: usize) -> Self {
        self.pending_queue_limit = limit.max(1);
        self
    }
}

/// Identity of the local device object.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalDeviceConfig {
    pub instance: u32,
    pub name: String,
    pub vendor_id: u16,
    pub vendor_name: String,
    pub model_name: String,
    pub description: String,
}

impl Default for LocalDeviceConfig {
    fn default() -> Self {
        Self {
            instance: 599,
            name: "bacflow".to_string(),
            vendor_id: 999,
            vendor_name: "bacflow".to_string(),
            model_name: "bacflow-stack".to_string(),
            description: String::new(),
        }
    }
}

impl LocalDeviceConfig {
    pub fn with_instance(mut self, instance: u32) -> Self {
        self.instance = instance;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_vendor(mut self, vendor_id: u16, vendor_name: impl Into<String>) -> Self {
        self.vendor_id = vendor_id;
        self.vendor_name = vendor_name.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Which B/IP layer sits at the bottom of a port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkConfig {
    #[default]
    Simple,
    Foreign { bbmd: SocketAddrV4, ttl: u16 },
    Bbmd { peers: Vec<BdtEntry> },
    Nat { global: SocketAddrV4, peers: Vec<BdtEntry> },
}
