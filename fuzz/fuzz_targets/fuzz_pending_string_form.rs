#![no_main]
use libfuzzer_sys::fuzz_target;
use potchain::core::transaction::TxToVerify;

fuzz_target!(|data: &str| {
    // State-file rows come from disk; parsing must never panic.
    let _ = TxToVerify::from_string_form(data);
});
