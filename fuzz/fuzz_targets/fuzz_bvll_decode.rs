#![no_main]

use bacflow_datalink::Bvll;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Bvll::decode(data) {
        let _ = frame.to_vec();
    }
});
