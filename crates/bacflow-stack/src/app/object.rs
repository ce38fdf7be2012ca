//! Local objects and the device that owns them.

use crate::config::{LocalDeviceConfig, SmapConfig};
use crate::error::ConfigError;
use bacflow_core::constructed::{Any, ArrayElement, ArrayOf};
use bacflow_core::datatype::Datatype;
use bacflow_core::services::{ErrorType, ReadPropertyRequest, WritePropertyRequest};
use bacflow_core::types::{
    CharacterString, ErrorClass, ErrorCode, MaxSegments, ObjectId, ObjectType, PropertyId, Unsigned,
};
use bacflow_core::EncodeError;
use std::collections::{BTreeMap, BTreeSet};

const PROTOCOL_VERSION: u32 = 1;
const PROTOCOL_REVISION: u32 = 22;

fn property_error(code: ErrorCode) -> ErrorType {
    ErrorType::new(ErrorClass::Property, code)
}

/// A stored property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Any),
    Array(ArrayOf<Any>),
}

impl PropertyValue {
    pub fn scalar<T: Datatype>(value: &T) -> Result<Self, EncodeError> {
        Any::cast_in(value).map(Self::Scalar)
    }

    pub fn array<T: Datatype>(items: &[T]) -> Result<Self, EncodeError> {
        items
            .iter()
            .map(Any::cast_in)
            .collect::<Result<ArrayOf<Any>, _>>()
            .map(Self::Array)
    }
}

/// One object: its identity plus a property table.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalObject {
    id: ObjectId,
    name: String,
    properties: BTreeMap<PropertyId, PropertyValue>,
    writable: BTreeSet<PropertyId>,
}

impl LocalObject {
    pub fn new(id: ObjectId, name: impl Into<String>) -> Result<Self, EncodeError> {
        let name = name.into();
        let mut object = Self {
            id,
            name: name.clone(),
            properties: BTreeMap::new(),
            writable: BTreeSet::new(),
        };
        object.set_value(PropertyId::ObjectIdentifier, &id)?;
        object.set_value(PropertyId::ObjectName, &CharacterString(name))?;
        object.set_value(PropertyId::ObjectType, &id.object_type())?;
        Ok(object)
    }

    pub fn with_value<T: Datatype>(mut self, property: PropertyId, value: &T) -> Result<Self, EncodeError> {
        self.set_value(property, value)?;
        Ok(self)
    }

    /// Marks `property` as accepting WriteProperty.
    pub fn writable(mut self, property: PropertyId) -> Self {
        self.writable.insert(property);
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_value<T: Datatype>(&mut self, property: PropertyId, value: &T) -> Result<(), EncodeError> {
        self.properties.insert(property, PropertyValue::scalar(value)?);
        Ok(())
    }

    pub fn set_property(&mut self, property: PropertyId, value: PropertyValue) {
        self.properties.insert(property, value);
    }

    pub fn property(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    pub fn is_writable(&self, property: PropertyId) -> bool {
        self.writable.contains(&property)
    }

    /// Properties listed in Property_List: everything but the identity
    /// triple and the list itself.
    pub fn property_list(&self) -> Vec<PropertyId> {
        self.properties
            .keys()
            .copied()
            .filter(|property| {
                !matches!(
                    property,
                    PropertyId::ObjectIdentifier
                        | PropertyId::ObjectName
                        | PropertyId::ObjectType
                        | PropertyId::PropertyList
                )
            })
            .collect()
    }

    pub fn read(&self, property: PropertyId, array_index: Option<u32>) -> Result<Any, ErrorType> {
        let encode_failed = |_| property_error(ErrorCode::Other);
        let computed;
        let value = match property {
            PropertyId::PropertyList => {
                computed = PropertyValue::array(&self.property_list()).map_err(encode_failed)?;
                &computed
            }
            _ => self
                .properties
                .get(&property)
                .ok_or(property_error(ErrorCode::UnknownProperty))?,
        };
        match (value, array_index) {
            (PropertyValue::Scalar(value), None) => Ok(value.clone()),
            (PropertyValue::Scalar(_), Some(_)) => Err(property_error(ErrorCode::PropertyIsNotAnArray)),
            (PropertyValue::Array(items), None) => Any::cast_in(items).map_err(encode_failed),
            (PropertyValue::Array(items), Some(index)) => match items.get(index) {
                Ok(ArrayElement::Length(len)) => Any::cast_in(&len).map_err(encode_failed),
                Ok(ArrayElement::Element(item)) => Ok(item.clone()),
                Err(_) => Err(property_error(ErrorCode::InvalidArrayIndex)),
            },
        }
    }

    pub fn write(&mut self, property: PropertyId, array_index: Option<u32>, value: Any) -> Result<(), ErrorType> {
        let current = self
            .properties
            .get_mut(&property)
            .ok_or(property_error(ErrorCode::UnknownProperty))?;
        if !self.writable.contains(&property) {
            return Err(property_error(ErrorCode::WriteAccessDenied));
        }
        match (current, array_index) {
            (PropertyValue::Scalar(slot), None) => {
                *slot = value;
            }
            (PropertyValue::Scalar(_), Some(_)) => {
                return Err(property_error(ErrorCode::PropertyIsNotAnArray));
            }
            // element boundaries of an untyped array are unknown
            (PropertyValue::Array(_), None) => {
                return Err(property_error(ErrorCode::WriteAccessDenied));
            }
            (PropertyValue::Array(items), Some(index)) => {
                items
                    .set(index, value)
                    .map_err(|_| property_error(ErrorCode::InvalidArrayIndex))?;
            }
        }
        if property == PropertyId::ObjectName {
            if let Ok(CharacterString(name)) = self.read(property, None).and_then(|any| {
                any.cast_out::<CharacterString>()
                    .map_err(|_| property_error(ErrorCode::InvalidDataType))
            }) {
                self.name = name;
            }
        }
        Ok(())
    }
}

fn max_segments_count(max_segments: MaxSegments) -> u32 {
    match max_segments {
        MaxSegments::Unspecified => 0,
        MaxSegments::MoreThanSixtyFour => 65,
        other => other.count().map_or(0, |count| count as u32),
    }
}

/// The local device object plus every other object it hosts.
///
/// Object_List on the device object always mirrors the database.
#[derive(Debug, Clone)]
pub struct LocalDevice {
    device_id: ObjectId,
    objects: BTreeMap<ObjectId, LocalObject>,
}

impl LocalDevice {
    pub fn new(config: &LocalDeviceConfig, smap: &SmapConfig) -> Result<Self, ConfigError> {
        if config.instance >= ObjectId::WILDCARD_INSTANCE {
            return Err(ConfigError::InvalidDevice(format!(
                "device instance {} out of range",
                config.instance
            )));
        }
        if config.name.is_empty() {
            return Err(ConfigError::InvalidDevice("device name is empty".into()));
        }
        let device_id = ObjectId::new(ObjectType::Device, config.instance);
        let encode = |err: EncodeError| ConfigError::InvalidDevice(err.to_string());
        let device = LocalObject::new(device_id, config.name.clone())
            .and_then(|o| o.with_value(PropertyId::VendorName, &CharacterString(config.vendor_name.clone())))
            .and_then(|o| o.with_value(PropertyId::VendorIdentifier, &Unsigned(u32::from(config.vendor_id))))
            .and_then(|o| o.with_value(PropertyId::ModelName, &CharacterString(config.model_name.clone())))
            .and_then(|o| o.with_value(PropertyId::Description, &CharacterString(config.description.clone())))
            .and_then(|o| o.with_value(PropertyId::ProtocolVersion, &Unsigned(PROTOCOL_VERSION)))
            .and_then(|o| o.with_value(PropertyId::ProtocolRevision, &Unsigned(PROTOCOL_REVISION)))
            .and_then(|o| {
                o.with_value(
                    PropertyId::MaxApduLengthAccepted,
                    &Unsigned(smap.max_apdu_length_accepted.octets() as u32),
                )
            })
            .and_then(|o| o.with_value(PropertyId::SegmentationSupported, &smap.segmentation_supported))
            .and_then(|o| {
                o.with_value(
                    PropertyId::MaxSegmentsAccepted,
                    &Unsigned(max_segments_count(smap.max_segments_accepted)),
                )
            })
            .and_then(|o| o.with_value(PropertyId::ApduTimeout, &Unsigned(smap.apdu_timeout.as_millis() as u32)))
            .and_then(|o| {
                o.with_value(
                    PropertyId::ApduSegmentTimeout,
                    &Unsigned(smap.segment_timeout.as_millis() as u32),
                )
            })
            .and_then(|o| {
                o.with_value(
                    PropertyId::NumberOfApduRetries,
                    &Unsigned(u32::from(smap.number_of_apdu_retries)),
                )
            })
            .map_err(encode)?
            .writable(PropertyId::Description);

        let mut this = Self {
            device_id,
            objects: BTreeMap::new(),
        };
        this.objects.insert(device_id, device);
        this.refresh_object_list().map_err(encode)?;
        Ok(this)
    }

    pub fn device_id(&self) -> ObjectId {
        self.device_id
    }

    pub fn name(&self) -> &str {
        self.objects
            .get(&self.device_id)
            .map_or("", LocalObject::name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add_object(&mut self, object: LocalObject) -> Result<(), ConfigError> {
        if self.objects.contains_key(&object.id()) {
            return Err(ConfigError::DuplicateObject(object.id()));
        }
        if object.id().object_type() == ObjectType::Device {
            return Err(ConfigError::InvalidDevice(format!(
                "{} would be a second device object",
                object.id()
            )));
        }
        if self.object_by_name(object.name()).is_some() {
            return Err(ConfigError::InvalidDevice(format!(
                "object name '{}' already used",
                object.name()
            )));
        }
        self.objects.insert(object.id(), object);
        self.refresh_object_list()
            .map_err(|err| ConfigError::InvalidDevice(err.to_string()))
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<LocalObject> {
        if id == self.device_id {
            return None;
        }
        let removed = self.objects.remove(&id)?;
        if let Err(err) = self.refresh_object_list() {
            log::warn!("object list not refreshed: {err}");
        }
        Some(removed)
    }

    /// Looks `id` up, treating the wildcard device instance as this device.
    pub fn object(&self, id: ObjectId) -> Option<&LocalObject> {
        self.objects.get(&self.resolve(id))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut LocalObject> {
        let id = self.resolve(id);
        self.objects.get_mut(&id)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&LocalObject> {
        self.objects.values().find(|object| object.name() == name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &LocalObject> {
        self.objects.values()
    }

    pub fn read_property(&self, request: &ReadPropertyRequest) -> Result<Any, ErrorType> {
        self.object(request.object_id)
            .ok_or(ErrorType::new(ErrorClass::Object, ErrorCode::UnknownObject))?
            .read(request.property_id, request.array_index)
    }

    pub fn write_property(&mut self, request: &WritePropertyRequest) -> Result<(), ErrorType> {
        if request.property_id == PropertyId::ObjectList {
            return Err(property_error(ErrorCode::WriteAccessDenied));
        }
        self.object_mut(request.object_id)
            .ok_or(ErrorType::new(ErrorClass::Object, ErrorCode::UnknownObject))?
            .write(request.property_id, request.array_index, request.value.clone())
    }

    fn resolve(&self, id: ObjectId) -> ObjectId {
        if id.object_type() == ObjectType::Device && id.instance() == ObjectId::WILDCARD_INSTANCE {
            self.device_id
        } else {
            id
        }
    }

    fn refresh_object_list(&mut self) -> Result<(), EncodeError> {
        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        let list = PropertyValue::array(&ids)?;
        if let Some(device) = self.objects.get_mut(&self.device_id) {
            device.set_property(PropertyId::ObjectList, list);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalDevice, LocalObject};
    use crate::config::{LocalDeviceConfig, SmapConfig};
    use crate::error::ConfigError;
    use bacflow_core::constructed::Any;
    use bacflow_core::services::{ReadPropertyRequest, WritePropertyRequest};
    use bacflow_core::types::{
        CharacterString, ErrorClass, ErrorCode, ObjectId, ObjectType, PropertyId, Real, Unsigned,
    };

    fn device() -> LocalDevice {
        let config = LocalDeviceConfig::default().with_instance(1000).with_name("plant");
        LocalDevice::new(&config, &SmapConfig::default()).unwrap()
    }

    fn sensor() -> LocalObject {
        LocalObject::new(ObjectId::new(ObjectType::AnalogValue, 1), "setpoint")
            .unwrap()
            .with_value(PropertyId::PresentValue, &Real(21.5))
            .unwrap()
            .writable(PropertyId::PresentValue)
    }

    fn read(device: &LocalDevice, id: ObjectId, property: PropertyId, index: Option<u32>) -> Result<Any, (ErrorClass, ErrorCode)> {
        let mut request = ReadPropertyRequest::new(id, property);
        request.array_index = index;
        device.read_property(&request).map_err(|e| (e.class, e.code))
    }

    #[test]
    fn object_list_tracks_the_database() {
        let mut device = device();
        let dev = device.device_id();
        assert_eq!(
            read(&device, dev, PropertyId::ObjectList, Some(0)).unwrap().cast_out::<Unsigned>(),
            Ok(Unsigned(1))
        );
        device.add_object(sensor()).unwrap();
        assert_eq!(
            read(&device, dev, PropertyId::ObjectList, Some(0)).unwrap().cast_out::<Unsigned>(),
            Ok(Unsigned(2))
        );
        assert_eq!(
            read(&device, dev, PropertyId::ObjectList, Some(2)).unwrap().cast_out::<ObjectId>(),
            Ok(ObjectId::new(ObjectType::AnalogValue, 1))
        );
        assert_eq!(
            read(&device, dev, PropertyId::ObjectList, Some(3)),
            Err((ErrorClass::Property, ErrorCode::InvalidArrayIndex))
        );
        assert_eq!(device.add_object(sensor()), Err(ConfigError::DuplicateObject(sensor().id())));
    }

    #[test]
    fn wildcard_instance_reads_the_local_device() {
        let device = device();
        let wildcard = ObjectId::new(ObjectType::Device, ObjectId::WILDCARD_INSTANCE);
        assert_eq!(
            read(&device, wildcard, PropertyId::ObjectName, None).unwrap().cast_out::<CharacterString>(),
            Ok(CharacterString("plant".into()))
        );
        assert_eq!(
            read(&device, wildcard, PropertyId::ObjectName, Some(1)),
            Err((ErrorClass::Property, ErrorCode::PropertyIsNotAnArray))
        );
        assert_eq!(
            read(&device, ObjectId::new(ObjectType::AnalogInput, 9), PropertyId::PresentValue, None),
            Err((ErrorClass::Object, ErrorCode::UnknownObject))
        );
        assert_eq!(
            read(&device, wildcard, PropertyId::PresentValue, None),
            Err((ErrorClass::Property, ErrorCode::UnknownProperty))
        );
    }

    #[test]
    fn only_writable_properties_accept_writes() {
        let mut device = device();
        device.add_object(sensor()).unwrap();
        let id = ObjectId::new(ObjectType::AnalogValue, 1);

        let write = WritePropertyRequest::new(id, PropertyId::PresentValue, Any::cast_in(&Real(19.0)).unwrap());
        device.write_property(&write).unwrap();
        assert_eq!(
            read(&device, id, PropertyId::PresentValue, None).unwrap().cast_out::<Real>(),
            Ok(Real(19.0))
        );

        let rename = WritePropertyRequest::new(
            id,
            PropertyId::ObjectName,
            Any::cast_in(&CharacterString("other".into())).unwrap(),
        );
        let err = device.write_property(&rename).unwrap_err();
        assert_eq!(err.code, ErrorCode::WriteAccessDenied);
    }

    #[test]
    fn property_list_omits_the_identity() {
        let object = sensor();
        assert_eq!(object.property_list(), vec![PropertyId::PresentValue]);
    }

    #[test]
    fn invalid_device_configuration_is_refused() {
        let config = LocalDeviceConfig::default().with_instance(ObjectId::WILDCARD_INSTANCE);
        assert!(matches!(
            LocalDevice::new(&config, &SmapConfig::default()),
            Err(ConfigError::InvalidDevice(_))
        ));
    }
}
