#![no_main]

use bacflow_core::npdu::Npdu;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(npdu) = Npdu::decode(data) {
        let _ = npdu.network_message();
    }
});
