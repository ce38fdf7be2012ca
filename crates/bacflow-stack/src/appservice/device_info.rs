//! What the stack knows about peer devices.

use bacflow_core::services::IAmRequest;
use bacflow_core::types::{MaxSegments, ObjectId, Segmentation};
use bacflow_core::Address;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Segmentation limits and identity of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    pub device_id: ObjectId,
    pub address: Address,
    /// Max APDU length accepted, in octets.
    pub max_apdu: usize,
    pub segmentation: Segmentation,
    pub max_segments: MaxSegments,
    pub vendor_id: u16,
}

impl DeviceInfo {
    pub fn from_i_am(address: Address, i_am: &IAmRequest) -> Self {
        Self {
            device_id: i_am.device_id,
            address,
            max_apdu: i_am.max_apdu as usize,
            segmentation: i_am.segmentation,
            max_segments: MaxSegments::Unspecified,
            vendor_id: i_am.vendor_id,
        }
    }
}

/// Peer table shared by the application and segmentation layers of one
/// stack. Clones share the same table; it never leaves the loop thread.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfoCache {
    inner: Rc<RefCell<HashMap<Address, DeviceInfo>>>,
}

impl DeviceInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<DeviceInfo> {
        self.inner.borrow().get(address).cloned()
    }

    pub fn by_instance(&self, instance: u32) -> Option<DeviceInfo> {
        self.inner
            .borrow()
            .values()
            .find(|info| info.device_id.instance() == instance)
            .cloned()
    }

    pub fn insert(&self, info: DeviceInfo) {
        self.inner.borrow_mut().insert(info.address.clone(), info);
    }

    /// Records an I-Am; a device that moved drops its old address.
    pub fn update_from_i_am(&self, address: Address, i_am: &IAmRequest) {
        let mut table = self.inner.borrow_mut();
        let known_max_segments = table.get(&address).map(|info| info.max_segments);
        table.retain(|addr, info| info.device_id != i_am.device_id || addr == &address);
        let mut info = DeviceInfo::from_i_am(address.clone(), i_am);
        if let Some(max_segments) = known_max_segments {
            info.max_segments = max_segments;
        }
        log::debug!("device {} at {address}", info.device_id);
        table.insert(address, info);
    }

    /// Records the max-segments a peer advertised in a confirmed request.
    pub fn update_max_segments(&self, address: &Address, max_segments: MaxSegments) {
        if let Some(info) = self.inner.borrow_mut().get_mut(address) {
            info.max_segments = max_segments;
        }
    }

    pub fn remove(&self, address: &Address) -> Option<DeviceInfo> {
        self.inner.borrow_mut().remove(address)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Every known device, ordered by instance.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<_> = self.inner.borrow().values().cloned().collect();
        devices.sort_by_key(|info| info.device_id.instance());
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceInfoCache;
    use bacflow_core::services::IAmRequest;
    use bacflow_core::types::{MaxSegments, ObjectId, ObjectType, Segmentation};
    use bacflow_core::Address;

    fn i_am(instance: u32) -> IAmRequest {
        IAmRequest {
            device_id: ObjectId::new(ObjectType::Device, instance),
            max_apdu: 480,
            segmentation: Segmentation::SegmentedBoth,
            vendor_id: 15,
        }
    }

    #[test]
    fn clones_share_one_table() {
        let cache = DeviceInfoCache::new();
        let view = cache.clone();
        cache.update_from_i_am(Address::local_station(vec![1]), &i_am(10));
        assert_eq!(view.by_instance(10).map(|info| info.max_apdu), Some(480));
    }

    #[test]
    fn moved_device_replaces_old_address() {
        let cache = DeviceInfoCache::new();
        let old = Address::local_station(vec![1]);
        cache.update_from_i_am(old.clone(), &i_am(10));
        cache.update_max_segments(&old, MaxSegments::Four);
        cache.update_from_i_am(Address::local_station(vec![2]), &i_am(10));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&old).is_none());

        cache.update_from_i_am(Address::local_station(vec![3]), &i_am(5));
        let instances: Vec<u32> = cache
            .devices()
            .iter()
            .map(|info| info.device_id.instance())
            .collect();
        assert_eq!(instances, vec![5, 10]);
    }
}
