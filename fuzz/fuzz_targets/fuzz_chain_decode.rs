#![no_main]
use libfuzzer_sys::fuzz_target;
use potchain::core::block::{decode_chain, encode_chain};

fuzz_target!(|data: &[u8]| {
    // Chain decoding must never panic; a successful decode round-trips.
    if let Ok(blocks) = decode_chain(data) {
        assert_eq!(encode_chain(&blocks), data);
    }
});
