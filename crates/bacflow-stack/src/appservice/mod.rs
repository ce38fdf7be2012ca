//! Application service layers: request screening, segmentation and the
//! peer device table they share.

mod asap;
mod device_info;
mod segment;
mod ssm;

pub use asap::Asap;
pub use device_info::{DeviceInfo, DeviceInfoCache};
pub use ssm::{Smap, SsmState};

use bacflow_core::Pdu;

/// `user_data` key marking an Abort raised by this stack rather than the
/// peer; the value is the abort reason.
pub const LOCAL_ABORT: &str = "local-abort";

pub fn is_local_abort(pdu: &Pdu) -> bool {
    pdu.user_data.contains_key(LOCAL_ABORT)
}
