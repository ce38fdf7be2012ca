//! I/O control blocks: one request, one eventual outcome.
//!
//! An [`Iocb`] is created on any thread, handed to an [`IoController`] on
//! the event-loop thread, and completed or aborted there exactly once.
//! Callbacks run on the completing thread in registration order; `wait`
//! blocks the calling thread and must never be used on the loop thread.

use crate::error::{IoError, IocbError};
use bacflow_core::apdu::{ComplexAck, ConfirmedRequest, SimpleAck, UnconfirmedRequest};
use bacflow_core::comm::LayerIo;
use bacflow_core::constructed::Any;
use bacflow_core::services::{
    self, ConfirmedService, ReadPropertyAck, ReadPropertyRequest, ServiceAck,
    ServiceDecodeError, UnconfirmedService, WhoIsRequest, WritePropertyRequest,
};
use bacflow_core::types::{ObjectId, PropertyId};
use bacflow_core::{Address, DecodeError, EncodeError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Application PDU an IOCB asks to have sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestApdu {
    /// The invoke id is assigned by the controller.
    Confirmed(ConfirmedRequest),
    Unconfirmed(UnconfirmedRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoRequest {
    pub destination: Address,
    pub apdu: RequestApdu,
}

/// What a completed IOCB carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoResponse {
    /// An unconfirmed request left the stack.
    Sent,
    SimpleAck(SimpleAck),
    ComplexAck(ComplexAck),
}

impl IoResponse {
    /// Decodes the Complex-ACK body as the ack type of service `S`.
    pub fn decode_ack<S: ServiceAck>(&self) -> Result<S, IoError> {
        let Self::ComplexAck(ack) = self else {
            return Err(IoError::Decode(DecodeError::InvalidValue));
        };
        services::decode_ack::<S>(ack).map_err(|err| match err {
            ServiceDecodeError::Decode(err) => IoError::Decode(err),
            ServiceDecodeError::UnrecognizedService(_) => IoError::Decode(DecodeError::InvalidValue),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoState {
    Pending,
    Completed,
    Aborted,
}

pub type IoOutcome = Result<IoResponse, IoError>;

type Callback = Box<dyn FnOnce(&IoOutcome) + Send>;

struct Slot {
    outcome: Option<IoOutcome>,
    callbacks: Vec<Callback>,
}

struct Inner {
    id: u64,
    request: IoRequest,
    created: Instant,
    slot: Mutex<Slot>,
    done: Condvar,
}

static NEXT_IOCB_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to one request and its eventual outcome.
#[derive(Clone)]
pub struct Iocb {
    inner: Arc<Inner>,
}

impl fmt::Debug for Iocb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iocb")
            .field("id", &self.inner.id)
            .field("destination", &self.inner.request.destination)
            .field("state", &self.state())
            .finish()
    }
}

impl Iocb {
    pub fn new(request: IoRequest) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_IOCB_ID.fetch_add(1, Ordering::Relaxed),
                request,
                created: Instant::now(),
                slot: Mutex::new(Slot {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn confirmed<S: ConfirmedService>(
        destination: Address,
        service: &S,
    ) -> Result<Self, EncodeError> {
        Ok(Self::new(IoRequest {
            destination,
            apdu: RequestApdu::Confirmed(services::confirmed_request(0, service)?),
        }))
    }

    pub fn unconfirmed<S: UnconfirmedService>(
        destination: Address,
        service: &S,
    ) -> Result<Self, EncodeError> {
        Ok(Self::new(IoRequest {
            destination,
            apdu: RequestApdu::Unconfirmed(services::unconfirmed_request(service)?),
        }))
    }

    pub fn read_property(
        destination: Address,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<Self, EncodeError> {
        let mut request = ReadPropertyRequest::new(object_id, property_id);
        request.array_index = array_index;
        Self::confirmed(destination, &request)
    }

    pub fn write_property(
        destination: Address,
        object_id: ObjectId,
        property_id: PropertyId,
        value: Any,
    ) -> Result<Self, EncodeError> {
        Self::confirmed(destination, &WritePropertyRequest::new(object_id, property_id, value))
    }

    pub fn who_is(destination: Address, request: WhoIsRequest) -> Result<Self, EncodeError> {
        Self::unconfirmed(destination, &request)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn request(&self) -> &IoRequest {
        &self.inner.request
    }

    pub fn age(&self) -> Duration {
        self.inner.created.elapsed()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> IoState {
        match &self.slot().outcome {
            None => IoState::Pending,
            Some(Ok(_)) => IoState::Completed,
            Some(Err(_)) => IoState::Aborted,
        }
    }

    pub fn outcome(&self) -> Option<IoOutcome> {
        self.slot().outcome.clone()
    }

    /// Registers `f` to run once the IOCB finishes; runs it now if it
    /// already has.
    pub fn add_callback(&self, f: impl FnOnce(&IoOutcome) + Send + 'static) {
        let mut slot = self.slot();
        match slot.outcome.clone() {
            Some(outcome) => {
                drop(slot);
                f(&outcome);
            }
            None => slot.callbacks.push(Box::new(f)),
        }
    }

    pub fn complete(&self, response: IoResponse) -> Result<(), IocbError> {
        self.finish(Ok(response))
    }

    pub fn abort(&self, err: IoError) -> Result<(), IocbError> {
        self.finish(Err(err))
    }

    fn finish(&self, outcome: IoOutcome) -> Result<(), IocbError> {
        let callbacks = {
            let mut slot = self.slot();
            if slot.outcome.is_some() {
                return Err(IocbError::AlreadyComplete);
            }
            slot.outcome = Some(outcome.clone());
            std::mem::take(&mut slot.callbacks)
        };
        self.inner.done.notify_all();
        match &outcome {
            Ok(_) => log::trace!("iocb {} completed", self.inner.id),
            Err(err) => log::debug!("iocb {} aborted: {err}", self.inner.id),
        }
        for callback in callbacks {
            callback(&outcome);
        }
        Ok(())
    }

    /// Blocks the calling thread until the IOCB finishes.
    pub fn wait(&self) -> IoOutcome {
        let mut slot = self.slot();
        loop {
            if let Some(outcome) = &slot.outcome {
                return outcome.clone();
            }
            slot = self
                .inner
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<IoOutcome> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot();
        loop {
            if let Some(outcome) = &slot.outcome {
                return Some(outcome.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .inner
                .done
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Convenience for ReadProperty: waits and extracts the value.
    pub fn wait_read_property(&self) -> Result<Any, IoError> {
        let response = self.wait()?;
        Ok(response.decode_ack::<ReadPropertyAck>()?.value)
    }
}

/// Accepts IOCBs on the event-loop thread.
///
/// A controller never fails synchronously: every problem ends up as an
/// abort on the IOCB.
pub trait IoController {
    fn request_io(&mut self, iocb: Iocb, io: &mut LayerIo);
}
