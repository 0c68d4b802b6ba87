#![no_main]
use libfuzzer_sys::fuzz_target;
use mpg_core::vm::codec::{decode, encode};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes either decode or fail cleanly; anything that decodes must
    // re-encode to a form that decodes to the same program.
    let Ok(program) = decode(data) else {
        return;
    };
    let bytes = encode(&program).unwrap_or_else(|e| panic!("decoded program does not encode: {e}"));
    let again = decode(&bytes).unwrap_or_else(|e| panic!("re-encoded program does not decode: {e}"));
    assert_eq!(again, program);
});
