#![no_main]

use bacflow_core::encoding::TagList;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(tags) = TagList::decode(data) {
        if let Ok(bytes) = tags.to_vec() {
            assert_eq!(TagList::decode(&bytes).ok(), Some(tags));
        }
    }
});
