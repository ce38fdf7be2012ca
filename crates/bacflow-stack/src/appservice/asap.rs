//! Application service access point: screens confirmed requests before the
//! application sees them.

use bacflow_core::apdu::{Apdu, RejectPdu, RejectReason};
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::services::{ConfirmedServiceRequest, ServiceDecodeError, UnconfirmedServiceRequest};
use bacflow_core::Pdu;

/// Rejects confirmed requests this stack cannot decode and drops malformed
/// unconfirmed ones; everything else passes through untouched.
#[derive(Debug, Default)]
pub struct Asap {
    rejected: u64,
}

impl Asap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmed requests answered with a Reject so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn reject(&mut self, io: &mut LayerIo, pdu: &Pdu, invoke_id: u8, reason: RejectReason) {
        self.rejected += 1;
        log::debug!("rejecting request {invoke_id} from {}: {reason}", pdu.source);
        match Apdu::Reject(RejectPdu { invoke_id, reason }).to_vec() {
            Ok(data) => io.request(pdu.reply(data)),
            Err(err) => log::warn!("cannot encode reject: {err}"),
        }
    }
}

impl Layer for Asap {
    fn name(&self) -> &'static str {
        "asap"
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        io.request(pdu);
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let apdu = match Apdu::decode(&pdu.data) {
            Ok(apdu) => apdu,
            Err(err) => {
                log::debug!("asap: malformed APDU from {}: {err}", pdu.source);
                return;
            }
        };
        match &apdu {
            Apdu::ConfirmedRequest(request) => {
                match ConfirmedServiceRequest::decode(request.service_choice, &request.data) {
                    Ok(_) => io.response(pdu),
                    Err(ServiceDecodeError::UnrecognizedService(_)) => {
                        self.reject(io, &pdu, request.invoke_id, RejectReason::UnrecognizedService)
                    }
                    Err(ServiceDecodeError::Decode(err)) => {
                        self.reject(io, &pdu, request.invoke_id, RejectReason::for_decode_error(err))
                    }
                }
            }
            Apdu::UnconfirmedRequest(request) => {
                match UnconfirmedServiceRequest::decode(request.service_choice, &request.data) {
                    Ok(_) => io.response(pdu),
                    Err(err) => log::debug!(
                        "asap: dropping {} from {}: {err}",
                        request.service(),
                        pdu.source
                    ),
                }
            }
            _ => io.response(pdu),
        }
    }
}
