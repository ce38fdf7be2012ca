#![no_main]

use bacflow_core::apdu::Apdu;
use bacflow_core::services::{ConfirmedServiceRequest, UnconfirmedServiceRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match Apdu::decode(data) {
        Ok(Apdu::ConfirmedRequest(request)) => {
            let _ = ConfirmedServiceRequest::decode(request.service_choice, &request.data);
        }
        Ok(Apdu::UnconfirmedRequest(request)) => {
            let _ = UnconfirmedServiceRequest::decode(request.service_choice, &request.data);
        }
        _ => {}
    }
});
