#![no_main]
use libfuzzer_sys::fuzz_target;
use potchain::core::transaction::Tx;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic; a successful decode must re-encode to the
    // consumed prefix.
    if let Ok(tx) = Tx::from_bytes(data) {
        let encoded = tx.encode();
        assert_eq!(&data[..encoded.len()], &encoded[..]);
    }
});
