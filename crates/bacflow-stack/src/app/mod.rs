//! The application layer: a local device serving requests, plus the IOCB
//! controller for requests this stack makes.

mod object;

pub use object::{LocalDevice, LocalObject, PropertyValue};

use crate::appservice::{is_local_abort, DeviceInfoCache};
use crate::config::SmapConfig;
use crate::error::IoError;
use crate::iocb::{IoController, IoResponse, Iocb, RequestApdu};
use bacflow_core::apdu::{
    AbortReason, Apdu, ComplexAck, ConfirmedRequest, ConfirmedServiceChoice, ErrorPdu, RejectPdu,
    RejectReason, SimpleAck, UnconfirmedRequest, UnconfirmedServiceChoice,
};
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::datatype::to_bytes;
use bacflow_core::services::{
    self, ConfirmedServiceRequest, ErrorType, IAmRequest, IHaveRequest, ReadPropertyAck,
    UnconfirmedService, UnconfirmedServiceRequest, WhoHasObject,
};
use bacflow_core::types::{ErrorClass, ErrorCode, ObjectId, PropertyId, Segmentation, Unsigned};
use bacflow_core::{Address, Pdu};
use std::collections::HashMap;

/// Successful outcome of a confirmed service handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Simple,
    Complex(Vec<u8>),
}

pub type ConfirmedHandler =
    fn(&mut Application, &Pdu, &ConfirmedServiceRequest, &mut LayerIo) -> Result<Answer, ErrorType>;
pub type UnconfirmedHandler = fn(&mut Application, &Pdu, &UnconfirmedServiceRequest, &mut LayerIo);

fn service_error(code: ErrorCode) -> ErrorType {
    ErrorType::new(ErrorClass::Services, code)
}

/// Top of a device stack.
///
/// Incoming requests are dispatched by service choice through two handler
/// tables; answers to our own requests complete the matching IOCB.
pub struct Application {
    device: LocalDevice,
    devices: DeviceInfoCache,
    max_apdu: u32,
    segmentation: Segmentation,
    confirmed: HashMap<ConfirmedServiceChoice, ConfirmedHandler>,
    unconfirmed: HashMap<UnconfirmedServiceChoice, UnconfirmedHandler>,
    pending: HashMap<(Address, u8), Iocb>,
    next_invoke_id: HashMap<Address, u8>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("device", &self.device.device_id())
            .field("known_devices", &self.devices.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Application {
    pub fn new(device: LocalDevice, smap: &SmapConfig, devices: DeviceInfoCache) -> Self {
        let mut app = Self {
            device,
            devices,
            max_apdu: smap.max_apdu_length_accepted.octets() as u32,
            segmentation: smap.segmentation_supported,
            confirmed: HashMap::new(),
            unconfirmed: HashMap::new(),
            pending: HashMap::new(),
            next_invoke_id: HashMap::new(),
        };
        app.register_confirmed(ConfirmedServiceChoice::ReadProperty, Self::do_read_property);
        app.register_confirmed(ConfirmedServiceChoice::WriteProperty, Self::do_write_property);
        app.register_unconfirmed(UnconfirmedServiceChoice::WhoIs, Self::do_who_is);
        app.register_unconfirmed(UnconfirmedServiceChoice::IAm, Self::do_i_am);
        app.register_unconfirmed(UnconfirmedServiceChoice::WhoHas, Self::do_who_has);
        app.register_unconfirmed(UnconfirmedServiceChoice::IHave, Self::do_i_have);
        app
    }

    /// Installs or replaces the handler for a confirmed service.
    pub fn register_confirmed(&mut self, choice: ConfirmedServiceChoice, handler: ConfirmedHandler) {
        self.confirmed.insert(choice, handler);
    }

    pub fn register_unconfirmed(&mut self, choice: UnconfirmedServiceChoice, handler: UnconfirmedHandler) {
        self.unconfirmed.insert(choice, handler);
    }

    pub fn device(&self) -> &LocalDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut LocalDevice {
        &mut self.device
    }

    pub fn devices(&self) -> &DeviceInfoCache {
        &self.devices
    }

    /// Confirmed requests still waiting for an answer.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Broadcasts our I-Am to every network.
    pub fn announce(&self, io: &mut LayerIo) {
        self.send_unconfirmed(io, Address::GlobalBroadcast, &self.i_am());
    }

    fn i_am(&self) -> IAmRequest {
        IAmRequest {
            device_id: self.device.device_id(),
            max_apdu: self.max_apdu,
            segmentation: self.segmentation,
            vendor_id: self.vendor_id(),
        }
    }

    fn vendor_id(&self) -> u16 {
        self.device
            .object(self.device.device_id())
            .and_then(|device| device.read(PropertyId::VendorIdentifier, None).ok())
            .and_then(|value| value.cast_out::<Unsigned>().ok())
            .and_then(|value| u16::try_from(value.0).ok())
            .unwrap_or(0)
    }

    fn send_unconfirmed<S: UnconfirmedService>(&self, io: &mut LayerIo, destination: Address, service: &S) {
        let apdu = services::unconfirmed_request(service).map(Apdu::UnconfirmedRequest);
        match apdu.and_then(|apdu| apdu.to_vec()) {
            Ok(data) => io.request(Pdu::new(data).with_destination(destination)),
            Err(err) => log::warn!("cannot encode {:?}: {err}", S::CHOICE),
        }
    }

    /// Answers to a local requester stay local; remote requesters get a
    /// global broadcast.
    fn answer_destination(source: &Address) -> Address {
        match source {
            Address::RemoteStation { .. } | Address::RemoteBroadcast { .. } => Address::GlobalBroadcast,
            _ => Address::LocalBroadcast,
        }
    }

    fn allocate_invoke_id(&mut self, peer: &Address) -> Option<u8> {
        let next = self.next_invoke_id.entry(peer.clone()).or_insert(0);
        for _ in 0..=u8::MAX {
            let candidate = *next;
            *next = next.wrapping_add(1);
            if !self.pending.contains_key(&(peer.clone(), candidate)) {
                return Some(candidate);
            }
        }
        None
    }

    // --- serving ---

    fn serve(&mut self, pdu: &Pdu, request: ConfirmedRequest, io: &mut LayerIo) {
        let invoke_id = request.invoke_id;
        let choice = request.service_choice;
        // the service access point below rejects what does not decode
        let service = match ConfirmedServiceRequest::decode(choice, &request.data) {
            Ok(service) => service,
            Err(err) => {
                log::debug!("dropping request {invoke_id} from {}: {err}", pdu.source);
                return;
            }
        };
        let reply = match self.confirmed.get(&service.choice()).copied() {
            None => Apdu::Reject(RejectPdu {
                invoke_id,
                reason: RejectReason::UnrecognizedService,
            }),
            Some(handler) => match handler(self, pdu, &service, io) {
                Ok(Answer::Simple) => Apdu::SimpleAck(SimpleAck {
                    invoke_id,
                    service_choice: choice,
                }),
                Ok(Answer::Complex(data)) => Apdu::ComplexAck(ComplexAck::new(invoke_id, choice, data)),
                Err(error) => {
                    log::debug!("{} from {}: {}/{}", request.service(), pdu.source, error.class, error.code);
                    match error.to_bytes() {
                        Ok(data) => Apdu::Error(ErrorPdu {
                            invoke_id,
                            service_choice: choice,
                            data,
                        }),
                        Err(err) => {
                            log::warn!("cannot encode error reply: {err}");
                            return;
                        }
                    }
                }
            },
        };
        match reply.to_vec() {
            Ok(data) => io.request(pdu.reply(data)),
            Err(err) => log::warn!("cannot encode reply to {}: {err}", pdu.source),
        }
    }

    fn do_read_property(&mut self, _pdu: &Pdu, service: &ConfirmedServiceRequest, _io: &mut LayerIo) -> Result<Answer, ErrorType> {
        let ConfirmedServiceRequest::ReadProperty(request) = service else {
            return Err(service_error(ErrorCode::ServiceRequestDenied));
        };
        let value = self.device.read_property(request)?;
        let mut ack = ReadPropertyAck::for_request(request, value);
        if ack.object_id.instance() == ObjectId::WILDCARD_INSTANCE {
            ack.object_id = self.device.device_id();
        }
        to_bytes(&ack)
            .map(Answer::Complex)
            .map_err(|_| service_error(ErrorCode::Other))
    }

    fn do_write_property(&mut self, pdu: &Pdu, service: &ConfirmedServiceRequest, _io: &mut LayerIo) -> Result<Answer, ErrorType> {
        let ConfirmedServiceRequest::WriteProperty(request) = service else {
            return Err(service_error(ErrorCode::ServiceRequestDenied));
        };
        self.device.write_property(request)?;
        log::debug!("{} wrote {} {}", pdu.source, request.object_id, request.property_id);
        Ok(Answer::Simple)
    }

    fn do_who_is(&mut self, pdu: &Pdu, service: &UnconfirmedServiceRequest, io: &mut LayerIo) {
        let UnconfirmedServiceRequest::WhoIs(request) = service else {
            return;
        };
        if request.matches(self.device.device_id().instance()) {
            self.send_unconfirmed(io, Self::answer_destination(&pdu.source), &self.i_am());
        }
    }

    fn do_i_am(&mut self, pdu: &Pdu, service: &UnconfirmedServiceRequest, _io: &mut LayerIo) {
        let UnconfirmedServiceRequest::IAm(i_am) = service else {
            return;
        };
        log::debug!("{} is at {}", i_am.device_id, pdu.source);
        self.devices.update_from_i_am(pdu.source.clone(), i_am);
    }

    fn do_who_has(&mut self, pdu: &Pdu, service: &UnconfirmedServiceRequest, io: &mut LayerIo) {
        let UnconfirmedServiceRequest::WhoHas(request) = service else {
            return;
        };
        if !request.matches_device(self.device.device_id().instance()) {
            return;
        }
        let found = match &request.object {
            WhoHasObject::ObjectId(id) => self.device.object(*id),
            WhoHasObject::ObjectName(name) => self.device.object_by_name(name),
        };
        if let Some(object) = found {
            let i_have = IHaveRequest {
                device_id: self.device.device_id(),
                object_id: object.id(),
                object_name: object.name().to_owned(),
            };
            self.send_unconfirmed(io, Self::answer_destination(&pdu.source), &i_have);
        }
    }

    fn do_i_have(&mut self, pdu: &Pdu, service: &UnconfirmedServiceRequest, _io: &mut LayerIo) {
        if let UnconfirmedServiceRequest::IHave(i_have) = service {
            log::info!(
                "{} at {} has {} '{}'",
                i_have.device_id,
                pdu.source,
                i_have.object_id,
                i_have.object_name
            );
        }
    }

    fn dispatch_unconfirmed(&mut self, pdu: &Pdu, request: UnconfirmedRequest, io: &mut LayerIo) {
        let service = match UnconfirmedServiceRequest::decode(request.service_choice, &request.data) {
            Ok(service) => service,
            Err(err) => {
                log::debug!("dropping {} from {}: {err}", request.service(), pdu.source);
                return;
            }
        };
        match self.unconfirmed.get(&service.choice()).copied() {
            Some(handler) => handler(self, pdu, &service, io),
            None => log::trace!("no handler for {}", request.service()),
        }
    }

    // --- client side ---

    fn settle(&mut self, pdu: &Pdu, answer: Apdu) {
        let Some(invoke_id) = answer.invoke_id() else {
            return;
        };
        let Some(iocb) = self.pending.remove(&(pdu.source.clone(), invoke_id)) else {
            log::debug!("unsolicited {:?} {invoke_id} from {}", answer.apdu_type(), pdu.source);
            return;
        };
        let outcome = match answer {
            Apdu::SimpleAck(ack) => Ok(IoResponse::SimpleAck(ack)),
            Apdu::ComplexAck(ack) => Ok(IoResponse::ComplexAck(ack)),
            Apdu::Error(error) => Err(match ErrorType::from_error_body(&error.data) {
                Ok(ErrorType { class, code }) => IoError::RemoteError { class, code },
                Err(err) => IoError::Decode(err),
            }),
            Apdu::Reject(reject) => Err(IoError::RemoteReject {
                reason: reject.reason,
            }),
            Apdu::Abort(abort) if is_local_abort(pdu) => Err(match abort.reason {
                AbortReason::TsmTimeout => IoError::Timeout,
                reason => IoError::Aborted { reason },
            }),
            Apdu::Abort(abort) => Err(IoError::RemoteAbort {
                reason: abort.reason,
            }),
            other => {
                log::debug!("unexpected {:?} for iocb {}", other.apdu_type(), iocb.id());
                Err(IoError::Decode(bacflow_core::DecodeError::InvalidValue))
            }
        };
        let finished = match outcome {
            Ok(response) => iocb.complete(response),
            Err(err) => iocb.abort(err),
        };
        if let Err(err) = finished {
            log::warn!("iocb {}: {err}", iocb.id());
        }
    }
}

fn finish(iocb: &Iocb, result: Result<IoResponse, IoError>) {
    let finished = match result {
        Ok(response) => iocb.complete(response),
        Err(err) => iocb.abort(err),
    };
    if let Err(err) = finished {
        log::warn!("iocb {}: {err}", iocb.id());
    }
}

impl IoController for Application {
    fn request_io(&mut self, iocb: Iocb, io: &mut LayerIo) {
        let destination = iocb.request().destination.clone();
        match iocb.request().apdu.clone() {
            RequestApdu::Unconfirmed(request) => match Apdu::UnconfirmedRequest(request).to_vec() {
                Ok(data) => {
                    io.request(Pdu::new(data).with_destination(destination));
                    finish(&iocb, Ok(IoResponse::Sent));
                }
                Err(err) => finish(&iocb, Err(err.into())),
            },
            RequestApdu::Confirmed(mut request) => {
                if destination.is_broadcast() || destination == Address::Null {
                    finish(&iocb, Err(IoError::Unreachable));
                    return;
                }
                let Some(invoke_id) = self.allocate_invoke_id(&destination) else {
                    finish(&iocb, Err(IoError::NoInvokeId));
                    return;
                };
                request.invoke_id = invoke_id;
                match Apdu::ConfirmedRequest(request).to_vec() {
                    Ok(data) => {
                        log::trace!("iocb {} is request {invoke_id} to {destination}", iocb.id());
                        self.pending.insert((destination.clone(), invoke_id), iocb);
                        io.request(
                            Pdu::new(data)
                                .with_destination(destination)
                                .with_expecting_reply(true),
                        );
                    }
                    Err(err) => finish(&iocb, Err(err.into())),
                }
            }
        }
    }
}

impl Layer for Application {
    fn name(&self) -> &'static str {
        "application"
    }

    fn start(&mut self, _io: &mut LayerIo) {
        log::info!("{} '{}' ready with {} objects", self.device.device_id(), self.device.name(), self.device.len());
    }

    fn stop(&mut self, _io: &mut LayerIo) {
        if !self.pending.is_empty() {
            log::debug!("aborting {} open requests", self.pending.len());
        }
        for (_, iocb) in self.pending.drain() {
            finish(&iocb, Err(IoError::Stopped));
        }
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let apdu = match Apdu::decode(&pdu.data) {
            Ok(apdu) => apdu,
            Err(err) => {
                log::debug!("application: malformed APDU from {}: {err}", pdu.source);
                return;
            }
        };
        match apdu {
            Apdu::ConfirmedRequest(request) => self.serve(&pdu, request, io),
            Apdu::UnconfirmedRequest(request) => self.dispatch_unconfirmed(&pdu, request, io),
            Apdu::SegmentAck(_) => {}
            answer => self.settle(&pdu, answer),
        }
    }
}
